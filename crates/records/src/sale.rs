use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storepulse_core::{Cents, CustomerId, DomainError, DomainResult, SaleId};

use crate::{optional_text, required_text};

/// A committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    /// Business date of the sale; this is what reporting windows filter on.
    pub date: DateTime<Utc>,
    pub product_name: String,
    /// Amount in minor units.
    pub amount_cents: Cents,
    /// `None` for anonymous (walk-in) purchases.
    pub customer_id: Option<CustomerId>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub const ENTITY_TYPE: &'static str = "sale";
}

/// Input for recording a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub date: DateTime<Utc>,
    pub product_name: String,
    pub amount_cents: Cents,
    pub customer_id: Option<CustomerId>,
    pub category: Option<String>,
}

impl NewSale {
    pub fn new(date: DateTime<Utc>, product_name: impl Into<String>, amount_cents: Cents) -> Self {
        Self {
            date,
            product_name: product_name.into(),
            amount_cents,
            customer_id: None,
            category: None,
        }
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Validate and normalize into a committed record.
    pub fn into_sale(self, id: SaleId, created_at: DateTime<Utc>) -> DomainResult<Sale> {
        ensure_positive(self.amount_cents)?;
        Ok(Sale {
            id,
            date: self.date,
            product_name: required_text("product_name", &self.product_name)?,
            amount_cents: self.amount_cents,
            customer_id: self.customer_id,
            category: optional_text(self.category),
            created_at,
        })
    }
}

/// Partial update of a sale. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePatch {
    pub date: Option<DateTime<Utc>>,
    pub product_name: Option<String>,
    pub amount_cents: Option<Cents>,
    pub customer_id: Option<Option<CustomerId>>,
    pub category: Option<Option<String>>,
}

impl SalePatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.product_name.is_none()
            && self.amount_cents.is_none()
            && self.customer_id.is_none()
            && self.category.is_none()
    }

    /// Apply onto `sale`. On error `sale` is left unchanged.
    pub fn apply_to(&self, sale: &mut Sale) -> DomainResult<()> {
        let product_name = match &self.product_name {
            Some(name) => Some(required_text("product_name", name)?),
            None => None,
        };
        if let Some(amount) = self.amount_cents {
            ensure_positive(amount)?;
        }

        if let Some(date) = self.date {
            sale.date = date;
        }
        if let Some(name) = product_name {
            sale.product_name = name;
        }
        if let Some(amount) = self.amount_cents {
            sale.amount_cents = amount;
        }
        if let Some(customer_id) = &self.customer_id {
            sale.customer_id = customer_id.clone();
        }
        if let Some(category) = &self.category {
            sale.category = optional_text(category.clone());
        }
        Ok(())
    }
}

fn ensure_positive(amount: Cents) -> DomainResult<()> {
    if amount.get() <= 0 {
        return Err(DomainError::validation("amount must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn coffee() -> NewSale {
        NewSale::new(jan(15), " Coffee ", Cents::new(599))
            .with_customer(CustomerId::new("CUST001").unwrap())
    }

    #[test]
    fn into_sale_trims_product_name() {
        let sale = coffee().into_sale(SaleId::new(), jan(15)).unwrap();
        assert_eq!(sale.product_name, "Coffee");
        assert_eq!(sale.amount_cents, Cents::new(599));
        assert_eq!(sale.created_at, jan(15));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut input = coffee();
        input.amount_cents = Cents::ZERO;
        let err = input.into_sale(SaleId::new(), jan(15)).unwrap_err();
        assert_eq!(err, DomainError::validation("amount must be positive"));
    }

    #[test]
    fn blank_product_is_rejected() {
        let input = NewSale::new(jan(15), "  ", Cents::new(100));
        assert!(input.into_sale(SaleId::new(), jan(15)).is_err());
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let mut sale = coffee().into_sale(SaleId::new(), jan(15)).unwrap();
        let patch = SalePatch {
            product_name: Some("Updated Product".to_string()),
            amount_cents: Some(Cents::new(7500)),
            customer_id: Some(None),
            ..Default::default()
        };
        patch.apply_to(&mut sale).unwrap();
        assert_eq!(sale.product_name, "Updated Product");
        assert_eq!(sale.amount_cents, Cents::new(7500));
        assert_eq!(sale.customer_id, None);
        assert_eq!(sale.date, jan(15));
    }

    #[test]
    fn invalid_patch_leaves_sale_untouched() {
        let mut sale = coffee().into_sale(SaleId::new(), jan(15)).unwrap();
        let before = sale.clone();
        let patch = SalePatch {
            product_name: Some("Renamed".to_string()),
            amount_cents: Some(Cents::new(-1)),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut sale).is_err());
        assert_eq!(sale, before);
    }

    #[test]
    fn sale_serializes_amount_as_integer_minor_units() {
        let sale = coffee().into_sale(SaleId::new(), jan(15)).unwrap();
        let value = serde_json::to_value(&sale).unwrap();
        assert_eq!(value["amount_cents"], serde_json::json!(599));
        assert_eq!(value["customer_id"], serde_json::json!("CUST001"));
    }
}
