use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storepulse_core::{CustomerId, DomainError, DomainResult};

use crate::optional_text;

/// A known customer. Sales reference customers by [`CustomerId`]; a sale may
/// name a customer id that has no `Customer` row yet (imports arrive in any order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub const ENTITY_TYPE: &'static str = "customer";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub id: CustomerId,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl NewCustomer {
    pub fn new(id: CustomerId) -> Self {
        Self {
            id,
            name: None,
            email: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn into_customer(self, created_at: DateTime<Utc>) -> DomainResult<Customer> {
        let email = optional_text(self.email);
        if let Some(email) = &email {
            validate_email(email)?;
        }
        Ok(Customer {
            id: self.id,
            name: optional_text(self.name),
            email,
            created_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<Option<String>>,
    pub email: Option<Option<String>>,
}

impl CustomerPatch {
    pub fn apply_to(&self, customer: &mut Customer) -> DomainResult<()> {
        let email = self.email.clone().map(optional_text);
        if let Some(Some(email)) = &email {
            validate_email(email)?;
        }

        if let Some(name) = &self.name {
            customer.name = optional_text(name.clone());
        }
        if let Some(email) = email {
            customer.email = email;
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> DomainResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(DomainError::validation(format!("invalid email address: {email}"))),
    }
}
