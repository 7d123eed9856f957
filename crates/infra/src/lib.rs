//! Infrastructure layer: KPI cache, persistence collaborators, mutation
//! services and configuration.

pub mod cache;
pub mod config;
pub mod services;
pub mod store;

pub use cache::{CacheAside, CacheError, CacheParams, CacheStats, TtlCache};
pub use config::{AnalyticsConfig, CacheTtls, ConfigError};
pub use services::{CustomersService, ExpensesService, SalesService, ServiceError};
pub use store::{AnalyticsQuery, InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError};
