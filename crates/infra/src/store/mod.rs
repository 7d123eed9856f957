//! Persistence collaborators: the write-side [`RecordStore`] and the
//! aggregate [`AnalyticsQuery`] primitives, with in-memory and Postgres
//! implementations.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use r#trait::{
    AnalyticsQuery, CategoryTotal, CustomerPurchases, PeriodRevenue, ProductRevenue, RecordStore,
    SalesTotals, StoreError, UNCATEGORIZED,
};
