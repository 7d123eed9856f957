use anyhow::Context;
use chrono::{Duration, Utc};

use storepulse_analytics::AnalyticsRuntime;
use storepulse_core::{Cents, CustomerId};
use storepulse_events::{EventFilter, EventType};
use storepulse_infra::config::AnalyticsConfig;
use storepulse_records::{NewCustomer, NewExpense, NewSale};

/// (product, price in major units, customer)
const MORNING_RUSH: &[(&str, f64, Option<&str>)] = &[
    ("Coffee", 5.99, Some("CUST001")),
    ("Croissant", 3.25, Some("CUST001")),
    ("Coffee", 5.99, Some("CUST002")),
    ("Sandwich", 8.50, None),
    ("Espresso Machine", 99.99, Some("CUST003")),
    ("Coffee", 5.99, Some("CUST002")),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storepulse_observability::init();

    let config = AnalyticsConfig::from_env().context("invalid configuration")?;
    let window_days = config.kpi_window_days;
    let runtime = AnalyticsRuntime::from_config(config)
        .await
        .context("failed to start analytics runtime")?;

    simulate_day(&runtime).await?;

    let summary = runtime.aggregator().calculate_all(window_days).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let notifications = runtime
        .bus()
        .get_events(&EventFilter::all().of_type(EventType::KpiCalculated))
        .len();
    tracing::info!(
        events = runtime.bus().len(),
        kpi_notifications = notifications,
        "simulation finished"
    );

    runtime.shutdown();
    Ok(())
}

async fn simulate_day(runtime: &AnalyticsRuntime) -> anyhow::Result<()> {
    let opened = Utc::now() - Duration::hours(8);

    for (raw, name) in [("CUST001", "Ada"), ("CUST002", "Grace"), ("CUST003", "Linus")] {
        let input = NewCustomer::new(CustomerId::new(raw)?).with_name(name);
        runtime.customers().create(input).await?;
    }

    for (i, (product, price, customer)) in MORNING_RUSH.iter().enumerate() {
        let at = opened + Duration::minutes(20 * i as i64);
        let mut input = NewSale::new(at, *product, Cents::from_major(*price)?);
        if let Some(raw) = customer {
            input = input.with_customer(CustomerId::new(*raw)?);
        }
        let sale = runtime.sales().create(input).await?;
        tracing::debug!(sale_id = %sale.id, product = %sale.product_name, "sale recorded");
    }

    let rent = NewExpense::new(opened, "Daily rent", Cents::from_major(45.00)?).with_category("Rent");
    runtime.expenses().create(rent).await?;

    Ok(())
}
