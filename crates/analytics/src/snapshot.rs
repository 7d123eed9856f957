//! KPI snapshot types.
//!
//! Pure outputs of a query over a bounded window. They have no identity and
//! are never persisted; the cache holds their JSON form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storepulse_core::{Cents, TimeWindow, TrendInterval};

/// Customers who spent more than this (minor units) in a window count as VIP.
pub const VIP_SPEND_THRESHOLD: Cents = Cents::new(50_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueMetrics {
    pub total_revenue: Cents,
    pub total_sales_count: u64,
    /// Zero when there are no sales.
    pub average_order_value: Cents,
}

impl RevenueMetrics {
    pub fn from_totals(total_revenue: Cents, total_sales_count: u64) -> Self {
        Self {
            total_revenue,
            total_sales_count,
            average_order_value: total_revenue.average_over(total_sales_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedProduct {
    pub product_name: String,
    pub total_revenue: Cents,
    pub sales_count: u64,
}

/// Products by revenue, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRanking {
    pub products: Vec<RankedProduct>,
}

impl ProductRanking {
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn leader(&self) -> Option<&RankedProduct> {
        self.products.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub revenue: Cents,
}

/// Revenue per bucket, ascending by period label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub interval: TrendInterval,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitMargin {
    pub revenue: Cents,
    pub expenses: Cents,
    /// `(revenue - expenses) / revenue * 100`; zero when revenue is zero.
    pub margin_percent: f64,
}

impl ProfitMargin {
    pub fn new(revenue: Cents, expenses: Cents) -> Self {
        let margin_percent = if revenue.is_zero() {
            0.0
        } else {
            (revenue - expenses).get() as f64 / revenue.get() as f64 * 100.0
        };
        Self {
            revenue,
            expenses,
            margin_percent,
        }
    }

    pub fn profit(&self) -> Cents {
        self.revenue - self.expenses
    }
}

/// Purchase behaviour of identified customers in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerAnalytics {
    /// Distinct customers with at least one purchase.
    pub total_customers: u64,
    /// Exactly one purchase.
    pub new_customers: u64,
    /// More than one purchase.
    pub repeat_customers: u64,
    pub vip_customers: u64,
    /// `repeat / total * 100`; zero without purchasers.
    pub repeat_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub category: String,
    pub total: Cents,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseBreakdown {
    pub total: Cents,
    pub categories: Vec<ExpenseCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub days: u32,
}

impl PeriodBounds {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::trailing_days(self.end, self.days)
    }
}

/// Composite produced by `calculate_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub period: PeriodBounds,
    pub revenue: RevenueMetrics,
    pub profit_margin: ProfitMargin,
    pub top_products: ProductRanking,
    pub repeat_customers: u64,
    /// Customer records on file (not windowed).
    pub total_customers: u64,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_revenue_has_zero_average() {
        assert_eq!(RevenueMetrics::from_totals(Cents::ZERO, 0), RevenueMetrics::default());
    }

    #[test]
    fn average_is_rounded_to_minor_units() {
        let metrics = RevenueMetrics::from_totals(Cents::new(2048), 3);
        assert_eq!(metrics.average_order_value, Cents::new(683));
    }

    #[test]
    fn margin_over_zero_revenue_is_zero() {
        let margin = ProfitMargin::new(Cents::ZERO, Cents::new(500));
        assert_eq!(margin.margin_percent, 0.0);
        assert_eq!(margin.profit(), Cents::new(-500));
    }

    #[test]
    fn margin_percentage() {
        let margin = ProfitMargin::new(Cents::new(10_000), Cents::new(2_000));
        assert!((margin.margin_percent - 80.0).abs() < f64::EPSILON);
    }
}
