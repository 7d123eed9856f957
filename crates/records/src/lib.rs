//! Retail records (sales, expenses, customers).
//!
//! These are the rows the mutation services commit and the analytics queries
//! aggregate over. This crate only holds the shapes and their validation
//! rules; there is no IO here.

pub mod customer;
pub mod expense;
pub mod sale;

pub use customer::{Customer, CustomerPatch, NewCustomer};
pub use expense::{Expense, ExpensePatch, NewExpense};
pub use sale::{NewSale, Sale, SalePatch};

use storepulse_core::{DomainError, DomainResult};

/// Trim a required text field, rejecting blanks.
pub(crate) fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blanks collapse to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
