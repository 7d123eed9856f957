use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storepulse_core::{Cents, DomainError, DomainResult, ExpenseId};

use crate::{optional_text, required_text};

/// A committed operating expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub date: DateTime<Utc>,
    pub description: String,
    pub amount_cents: Cents,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub const ENTITY_TYPE: &'static str = "expense";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub date: DateTime<Utc>,
    pub description: String,
    pub amount_cents: Cents,
    pub category: Option<String>,
}

impl NewExpense {
    pub fn new(date: DateTime<Utc>, description: impl Into<String>, amount_cents: Cents) -> Self {
        Self {
            date,
            description: description.into(),
            amount_cents,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn into_expense(self, id: ExpenseId, created_at: DateTime<Utc>) -> DomainResult<Expense> {
        ensure_positive(self.amount_cents)?;
        Ok(Expense {
            id,
            date: self.date,
            description: required_text("description", &self.description)?,
            amount_cents: self.amount_cents,
            category: optional_text(self.category),
            created_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensePatch {
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub amount_cents: Option<Cents>,
    pub category: Option<Option<String>>,
}

impl ExpensePatch {
    /// Apply onto `expense`. On error `expense` is left unchanged.
    pub fn apply_to(&self, expense: &mut Expense) -> DomainResult<()> {
        let description = match &self.description {
            Some(d) => Some(required_text("description", d)?),
            None => None,
        };
        if let Some(amount) = self.amount_cents {
            ensure_positive(amount)?;
        }

        if let Some(date) = self.date {
            expense.date = date;
        }
        if let Some(description) = description {
            expense.description = description;
        }
        if let Some(amount) = self.amount_cents {
            expense.amount_cents = amount;
        }
        if let Some(category) = &self.category {
            expense.category = optional_text(category.clone());
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

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 8, 0, 0).unwrap()
    }

    #[test]
    fn blank_category_collapses_to_none() {
        let expense = NewExpense::new(day(), "Milk delivery", Cents::new(2000))
            .with_category("   ")
            .into_expense(ExpenseId::new(), day())
            .unwrap();
        assert_eq!(expense.category, None);
    }

    #[test]
    fn missing_description_is_rejected() {
        let err = NewExpense::new(day(), "", Cents::new(2000))
            .into_expense(ExpenseId::new(), day())
            .unwrap_err();
        assert_eq!(err, DomainError::validation("description must not be empty"));
    }

    #[test]
    fn patch_changes_amount() {
        let mut expense = NewExpense::new(day(), "Rent", Cents::new(100_000))
            .into_expense(ExpenseId::new(), day())
            .unwrap();
        ExpensePatch {
            amount_cents: Some(Cents::new(95_000)),
            ..Default::default()
        }
        .apply_to(&mut expense)
        .unwrap();
        assert_eq!(expense.amount_cents, Cents::new(95_000));
    }
}
