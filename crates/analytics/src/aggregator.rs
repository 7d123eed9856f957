//! KPI aggregation over the persistence collaborator, one cache namespace
//! per operation.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use storepulse_core::{Cents, Clock, DomainError, TimeWindow, TrendInterval};
use storepulse_events::{BusError, EventBus};
use storepulse_infra::cache::{CacheAside, CacheError, CacheParams, TtlCache};
use storepulse_infra::config::{AnalyticsConfig, CacheTtls};
use storepulse_infra::store::{AnalyticsQuery, StoreError};

use crate::recalculation::{SUMMARY_KPI_TYPE, kpi_calculated_event, kpi_payload};
use crate::snapshot::{
    CustomerAnalytics, ExpenseBreakdown, ExpenseCategory, KpiSummary, PeriodBounds,
    ProductRanking, ProfitMargin, RankedProduct, RevenueMetrics, TrendPoint, TrendSeries,
    VIP_SPEND_THRESHOLD,
};

pub mod namespace {
    pub const REVENUE_METRICS: &str = "revenue_metrics";
    pub const TOTAL_REVENUE: &str = "total_revenue";
    pub const TOP_PRODUCTS: &str = "top_products";
    pub const REPEAT_CUSTOMERS: &str = "repeat_customers";
    pub const PROFIT_MARGIN: &str = "profit_margin";
    pub const REVENUE_TREND: &str = "revenue_trend";
    pub const CUSTOMER_ANALYTICS: &str = "customer_analytics";
    pub const EXPENSE_BREAKDOWN: &str = "expense_breakdown";
    pub const KPI_SUMMARY: &str = "kpi_summary";

    pub const ALL: [&str; 9] = [
        REVENUE_METRICS,
        TOTAL_REVENUE,
        TOP_PRODUCTS,
        REPEAT_CUSTOMERS,
        PROFIT_MARGIN,
        REVENUE_TREND,
        CUSTOMER_ANALYTICS,
        EXPENSE_BREAKDOWN,
        KPI_SUMMARY,
    ];
}

#[derive(Debug, Error)]
pub enum KpiError {
    /// The persistence layer failed. Never cached, never retried.
    #[error("KPI query failed: {0}")]
    Query(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("KPI event not published: {0}")]
    Publish(#[from] BusError),

    #[error(transparent)]
    Validation(#[from] DomainError),
}

/// Computes KPIs, each cached independently with its own TTL.
///
/// `calculate_all` additionally publishes `kpi.calculated` every time it
/// completes, whether the summary came from cache or not.
pub struct KpiAggregator {
    query: Arc<dyn AnalyticsQuery>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    cache: Arc<TtlCache>,
    top_products_limit: usize,

    revenue_metrics: CacheAside<RevenueMetrics>,
    total_revenue: CacheAside<Cents>,
    top_products: CacheAside<ProductRanking>,
    repeat_customers: CacheAside<u64>,
    profit_margin: CacheAside<ProfitMargin>,
    revenue_trend: CacheAside<TrendSeries>,
    customer_analytics: CacheAside<CustomerAnalytics>,
    expense_breakdown: CacheAside<ExpenseBreakdown>,
    summary: CacheAside<KpiSummary>,
}

impl KpiAggregator {
    pub fn new(
        query: Arc<dyn AnalyticsQuery>,
        bus: Arc<EventBus>,
        cache: Arc<TtlCache>,
        clock: Arc<dyn Clock>,
        config: &AnalyticsConfig,
    ) -> Self {
        let CacheTtls {
            summary,
            revenue,
            top_products,
            default,
        } = config.ttls;

        Self {
            revenue_metrics: CacheAside::new(Arc::clone(&cache), namespace::REVENUE_METRICS, revenue),
            total_revenue: CacheAside::new(Arc::clone(&cache), namespace::TOTAL_REVENUE, revenue),
            top_products: CacheAside::new(Arc::clone(&cache), namespace::TOP_PRODUCTS, top_products),
            repeat_customers: CacheAside::new(Arc::clone(&cache), namespace::REPEAT_CUSTOMERS, default),
            profit_margin: CacheAside::new(Arc::clone(&cache), namespace::PROFIT_MARGIN, default),
            revenue_trend: CacheAside::new(Arc::clone(&cache), namespace::REVENUE_TREND, default),
            customer_analytics: CacheAside::new(
                Arc::clone(&cache),
                namespace::CUSTOMER_ANALYTICS,
                default,
            ),
            expense_breakdown: CacheAside::new(
                Arc::clone(&cache),
                namespace::EXPENSE_BREAKDOWN,
                default,
            ),
            summary: CacheAside::new(Arc::clone(&cache), namespace::KPI_SUMMARY, summary),
            query,
            bus,
            clock,
            cache,
            top_products_limit: config.top_products_limit,
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub async fn revenue_metrics(&self, window: TimeWindow) -> Result<RevenueMetrics, KpiError> {
        let params = window_params(window)?;
        self.revenue_metrics
            .get_or_compute(&params, || compute_revenue_metrics(&*self.query, window))
            .await
    }

    /// Revenue over the trailing `days`.
    pub async fn total_revenue(&self, days: u32) -> Result<Cents, KpiError> {
        let params = CacheParams::new().with("days", &days)?;
        let window = self.trailing(days);
        self.total_revenue
            .get_or_compute(&params, || async move {
                Ok::<_, KpiError>(self.query.sales_totals(window).await?.total_cents)
            })
            .await
    }

    pub async fn top_products(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<ProductRanking, KpiError> {
        if limit == 0 {
            return Err(DomainError::validation("limit must be greater than zero").into());
        }
        let params = window_params(window)?.with("limit", &limit)?;
        self.top_products
            .get_or_compute(&params, || compute_top_products(&*self.query, window, limit))
            .await
    }

    /// Identified customers with more than one purchase in `window`.
    pub async fn repeat_customers(&self, window: TimeWindow) -> Result<u64, KpiError> {
        let params = window_params(window)?;
        self.repeat_customers
            .get_or_compute(&params, || async move {
                Ok::<_, KpiError>(self.query.repeat_customer_count(window).await?)
            })
            .await
    }

    /// Margin over the trailing `days`.
    pub async fn profit_margin(&self, days: u32) -> Result<ProfitMargin, KpiError> {
        let params = CacheParams::new().with("days", &days)?;
        let window = self.trailing(days);
        self.profit_margin
            .get_or_compute(&params, || compute_profit_margin(&*self.query, window))
            .await
    }

    pub async fn revenue_trend(
        &self,
        window: TimeWindow,
        interval: TrendInterval,
    ) -> Result<TrendSeries, KpiError> {
        let params = window_params(window)?.with("interval", &interval)?;
        self.revenue_trend
            .get_or_compute(&params, || async move {
                let points = self
                    .query
                    .revenue_by_period(window, interval)
                    .await?
                    .into_iter()
                    .map(|p| TrendPoint {
                        period: p.period,
                        revenue: p.revenue,
                    })
                    .collect();
                Ok::<_, KpiError>(TrendSeries { interval, points })
            })
            .await
    }

    pub async fn customer_analytics(
        &self,
        window: TimeWindow,
    ) -> Result<CustomerAnalytics, KpiError> {
        let params = window_params(window)?;
        self.customer_analytics
            .get_or_compute(&params, || compute_customer_analytics(&*self.query, window))
            .await
    }

    pub async fn expense_breakdown(&self, window: TimeWindow) -> Result<ExpenseBreakdown, KpiError> {
        let params = window_params(window)?;
        self.expense_breakdown
            .get_or_compute(&params, || async move {
                let categories: Vec<ExpenseCategory> = self
                    .query
                    .expenses_by_category(window)
                    .await?
                    .into_iter()
                    .map(|c| ExpenseCategory {
                        category: c.category,
                        total: c.total_cents,
                        count: c.count,
                    })
                    .collect();
                Ok::<_, KpiError>(ExpenseBreakdown {
                    total: categories.iter().map(|c| c.total).sum(),
                    categories,
                })
            })
            .await
    }

    /// Composite summary for the trailing `days`, then a `kpi.calculated`
    /// notification tagged `kpi_summary`.
    pub async fn calculate_all(&self, days: u32) -> Result<KpiSummary, KpiError> {
        let params = CacheParams::new().with("days", &days)?;
        let summary = self
            .summary
            .get_or_compute(&params, || self.compute_summary(days))
            .await?;
        self.announce_summary(&summary).await?;
        Ok(summary)
    }

    /// Drop every cached KPI and recompute the composite for `days`.
    ///
    /// The recompute never reuses a summary from a computation that was
    /// already in flight: it waits for it, then queries again.
    pub async fn refresh_all(&self, days: u32) -> Result<KpiSummary, KpiError> {
        let dropped: usize = namespace::ALL
            .iter()
            .map(|ns| self.cache.invalidate_namespace(ns))
            .sum();
        tracing::debug!(dropped, days, "KPI cache invalidated");

        let params = CacheParams::new().with("days", &days)?;
        let summary = self
            .summary
            .refresh(&params, || self.compute_summary(days))
            .await?;
        self.announce_summary(&summary).await?;
        Ok(summary)
    }

    fn trailing(&self, days: u32) -> TimeWindow {
        TimeWindow::trailing_days(self.clock.now(), days)
    }

    async fn compute_summary(&self, days: u32) -> Result<KpiSummary, KpiError> {
        let now = self.clock.now();
        let window = TimeWindow::trailing_days(now, days);
        let query = &*self.query;

        let revenue = compute_revenue_metrics(query, window).await?;
        let expenses = query.expense_total(window).await?;
        let top_products = compute_top_products(query, window, self.top_products_limit).await?;
        let repeat_customers = query.repeat_customer_count(window).await?;
        let total_customers = query.customer_count().await?;

        Ok(KpiSummary {
            period: PeriodBounds {
                start: window.start(),
                end: window.end(),
                days,
            },
            profit_margin: ProfitMargin::new(revenue.total_revenue, expenses),
            revenue,
            top_products,
            repeat_customers,
            total_customers,
            calculated_at: now,
        })
    }

    async fn announce_summary(&self, summary: &KpiSummary) -> Result<(), KpiError> {
        let now = self.clock.now();
        let mut payload = kpi_payload(SUMMARY_KPI_TYPE, None, now);
        payload.insert("days".to_string(), Value::from(summary.period.days));
        self.bus
            .publish(kpi_calculated_event(SUMMARY_KPI_TYPE, payload, now))
            .await?;
        Ok(())
    }
}

fn window_params(window: TimeWindow) -> Result<CacheParams, CacheError> {
    CacheParams::new()
        .with("start", &window.start())?
        .with("end", &window.end())
}

async fn compute_revenue_metrics(
    query: &dyn AnalyticsQuery,
    window: TimeWindow,
) -> Result<RevenueMetrics, KpiError> {
    let totals = query.sales_totals(window).await?;
    Ok(RevenueMetrics::from_totals(totals.total_cents, totals.count))
}

async fn compute_top_products(
    query: &dyn AnalyticsQuery,
    window: TimeWindow,
    limit: usize,
) -> Result<ProductRanking, KpiError> {
    let products = query
        .revenue_by_product(window, limit)
        .await?
        .into_iter()
        .map(|p| RankedProduct {
            product_name: p.product_name,
            total_revenue: p.total_cents,
            sales_count: p.sales_count,
        })
        .collect();
    Ok(ProductRanking { products })
}

async fn compute_profit_margin(
    query: &dyn AnalyticsQuery,
    window: TimeWindow,
) -> Result<ProfitMargin, KpiError> {
    let revenue = query.sales_totals(window).await?.total_cents;
    let expenses = query.expense_total(window).await?;
    Ok(ProfitMargin::new(revenue, expenses))
}

async fn compute_customer_analytics(
    query: &dyn AnalyticsQuery,
    window: TimeWindow,
) -> Result<CustomerAnalytics, KpiError> {
    let purchases = query.customer_purchases(window).await?;

    let total = purchases.len() as u64;
    let repeat = purchases.iter().filter(|c| c.purchase_count > 1).count() as u64;
    let new = purchases.iter().filter(|c| c.purchase_count == 1).count() as u64;
    let vip = purchases
        .iter()
        .filter(|c| c.total_spent > VIP_SPEND_THRESHOLD)
        .count() as u64;
    let repeat_rate = if total == 0 {
        0.0
    } else {
        repeat as f64 / total as f64 * 100.0
    };

    Ok(CustomerAnalytics {
        total_customers: total,
        new_customers: new,
        repeat_customers: repeat,
        vip_customers: vip,
        repeat_rate,
    })
}
