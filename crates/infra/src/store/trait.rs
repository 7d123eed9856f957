use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storepulse_core::{Cents, CustomerId, ExpenseId, SaleId, TimeWindow, TrendInterval};
use storepulse_records::{Customer, Expense, Sale};

/// Persistence failure.
///
/// These are infrastructure errors; record validation happens before a
/// store is ever called.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    Conflict(String),

    /// Connection, query or decoding failure in the backing store.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Sum and count of sales in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTotals {
    pub total_cents: Cents,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRevenue {
    pub product_name: String,
    pub total_cents: Cents,
    pub sales_count: u64,
}

/// Purchases of one identified customer in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPurchases {
    pub customer_id: CustomerId,
    pub purchase_count: u64,
    pub total_spent: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total_cents: Cents,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRevenue {
    pub period: String,
    pub revenue: Cents,
}

/// Label used for expenses without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Write side used by the mutation services.
///
/// `insert_*` commits a new row, `update_*` replaces an existing one (error if
/// absent) and `delete_*` removes and returns it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_sale(&self, sale: &Sale) -> Result<(), StoreError>;
    async fn update_sale(&self, sale: &Sale) -> Result<(), StoreError>;
    async fn delete_sale(&self, id: SaleId) -> Result<Sale, StoreError>;
    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError>;
    async fn update_expense(&self, expense: &Expense) -> Result<(), StoreError>;
    async fn delete_expense(&self, id: ExpenseId) -> Result<Expense, StoreError>;
    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the id is taken.
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError>;
    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError>;
    async fn delete_customer(&self, id: &CustomerId) -> Result<Customer, StoreError>;
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError>;
}

/// Aggregate read primitives the KPI layer is computed from.
///
/// Every windowed query filters on the record's business `date` with
/// half-open `[start, end)` semantics.
#[async_trait]
pub trait AnalyticsQuery: Send + Sync {
    async fn sales_totals(&self, window: TimeWindow) -> Result<SalesTotals, StoreError>;

    /// Revenue per product, highest first; equal totals ordered by name.
    async fn revenue_by_product(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<ProductRevenue>, StoreError>;

    /// Distinct identified customers with more than one purchase.
    async fn repeat_customer_count(&self, window: TimeWindow) -> Result<u64, StoreError>;

    /// Anonymous sales are excluded. Ordered by customer id.
    async fn customer_purchases(&self, window: TimeWindow)
    -> Result<Vec<CustomerPurchases>, StoreError>;

    async fn expense_total(&self, window: TimeWindow) -> Result<Cents, StoreError>;

    /// Per category, highest total first; equal totals ordered by category.
    async fn expenses_by_category(&self, window: TimeWindow)
    -> Result<Vec<CategoryTotal>, StoreError>;

    /// Revenue per period bucket, ascending by label.
    async fn revenue_by_period(
        &self,
        window: TimeWindow,
        interval: TrendInterval,
    ) -> Result<Vec<PeriodRevenue>, StoreError>;

    /// Number of customer records (not windowed).
    async fn customer_count(&self) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> AnalyticsQuery for Arc<S>
where
    S: AnalyticsQuery + ?Sized,
{
    async fn sales_totals(&self, window: TimeWindow) -> Result<SalesTotals, StoreError> {
        (**self).sales_totals(window).await
    }

    async fn revenue_by_product(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<ProductRevenue>, StoreError> {
        (**self).revenue_by_product(window, limit).await
    }

    async fn repeat_customer_count(&self, window: TimeWindow) -> Result<u64, StoreError> {
        (**self).repeat_customer_count(window).await
    }

    async fn customer_purchases(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CustomerPurchases>, StoreError> {
        (**self).customer_purchases(window).await
    }

    async fn expense_total(&self, window: TimeWindow) -> Result<Cents, StoreError> {
        (**self).expense_total(window).await
    }

    async fn expenses_by_category(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CategoryTotal>, StoreError> {
        (**self).expenses_by_category(window).await
    }

    async fn revenue_by_period(
        &self,
        window: TimeWindow,
        interval: TrendInterval,
    ) -> Result<Vec<PeriodRevenue>, StoreError> {
        (**self).revenue_by_period(window, interval).await
    }

    async fn customer_count(&self) -> Result<u64, StoreError> {
        (**self).customer_count().await
    }
}
