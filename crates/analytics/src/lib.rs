//! KPI layer: aggregation over the record store, per-KPI caching, and the
//! recalculation handler that keeps cached KPIs fresh after mutations.

pub mod aggregator;
pub mod recalculation;
pub mod runtime;
pub mod snapshot;


pub use aggregator::{KpiAggregator, KpiError};
pub use recalculation::{KpiGroup, RecalculationHandler};
pub use runtime::{AnalyticsRuntime, RuntimeError};
pub use snapshot::{
    CustomerAnalytics, ExpenseBreakdown, KpiSummary, ProductRanking, ProfitMargin, RevenueMetrics,
    TrendSeries,
};
