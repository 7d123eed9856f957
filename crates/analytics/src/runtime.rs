//! Explicit wiring of the KPI pipeline with a start/shutdown lifecycle.

use std::sync::Arc;

use thiserror::Error;

use storepulse_core::{Clock, SystemClock};
use storepulse_events::{BusError, EventBus};
use storepulse_infra::cache::TtlCache;
use storepulse_infra::config::{AnalyticsConfig, ConfigError};
use storepulse_infra::services::{CustomersService, ExpensesService, SalesService};
use storepulse_infra::store::{
    AnalyticsQuery, InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError,
};

use crate::aggregator::KpiAggregator;
use crate::recalculation::RecalculationHandler;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to wire event handlers: {0}")]
    Bus(#[from] BusError),
}

/// Owns the process-wide cache, bus, aggregator and mutation services.
///
/// Built once at startup and passed by reference; nothing here is global.
/// Dropping the runtime shuts the bus down, releasing the recalculation
/// handler's references back to it.
pub struct AnalyticsRuntime {
    config: AnalyticsConfig,
    bus: Arc<EventBus>,
    cache: Arc<TtlCache>,
    aggregator: Arc<KpiAggregator>,
    sales: SalesService,
    expenses: ExpensesService,
    customers: CustomersService,
}

impl AnalyticsRuntime {
    /// Wire everything over `store` and subscribe the recalculation handler.
    pub fn start<S>(
        config: AnalyticsConfig,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError>
    where
        S: RecordStore + AnalyticsQuery + 'static,
    {
        config.validate()?;

        let bus = Arc::new(EventBus::new());
        let cache = Arc::new(TtlCache::new(Arc::clone(&clock)));
        let query: Arc<dyn AnalyticsQuery> = store.clone();
        let records: Arc<dyn RecordStore> = store;

        let aggregator = Arc::new(KpiAggregator::new(
            query,
            Arc::clone(&bus),
            Arc::clone(&cache),
            Arc::clone(&clock),
            &config,
        ));

        let handler = Arc::new(RecalculationHandler::new(
            Arc::clone(&aggregator),
            Arc::clone(&bus),
            Arc::clone(&clock),
            config.kpi_window_days,
        ));
        RecalculationHandler::register(handler, &bus)?;

        let sales = SalesService::new(Arc::clone(&records), Arc::clone(&bus), Arc::clone(&clock));
        let expenses =
            ExpensesService::new(Arc::clone(&records), Arc::clone(&bus), Arc::clone(&clock));
        let customers = CustomersService::new(records, Arc::clone(&bus), clock);

        tracing::info!(
            window_days = config.kpi_window_days,
            top_products_limit = config.top_products_limit,
            "analytics runtime started"
        );

        Ok(Self {
            config,
            bus,
            cache,
            aggregator,
            sales,
            expenses,
            customers,
        })
    }

    /// In-memory storage and the system clock.
    pub fn in_memory(config: AnalyticsConfig) -> Result<Self, RuntimeError> {
        Self::start(config, Arc::new(InMemoryRecordStore::new()), Arc::new(SystemClock))
    }

    /// Postgres when `database_url` is configured, in-memory otherwise.
    pub async fn from_config(config: AnalyticsConfig) -> Result<Self, RuntimeError> {
        match config.database_url.clone() {
            Some(url) => {
                let store = PostgresRecordStore::connect(&url, 5).await?;
                store.migrate().await?;
                Self::start(config, Arc::new(store), Arc::new(SystemClock))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory storage");
                Self::in_memory(config)
            }
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn aggregator(&self) -> &KpiAggregator {
        &self.aggregator
    }

    pub fn sales(&self) -> &SalesService {
        &self.sales
    }

    pub fn expenses(&self) -> &ExpensesService {
        &self.expenses
    }

    pub fn customers(&self) -> &CustomersService {
        &self.customers
    }

    /// Stop dispatching and drop cached KPIs.
    ///
    /// Subscriptions are released here, which also releases the handler's
    /// references back to the bus and aggregator.
    pub fn shutdown(&self) {
        self.bus.shutdown();
        self.cache.clear();
        tracing::info!(events_published = self.bus.len(), "analytics runtime stopped");
    }
}

impl Drop for AnalyticsRuntime {
    fn drop(&mut self) {
        if !self.bus.is_closed() {
            self.bus.shutdown();
        }
    }
}
