//! Reacts to record mutations by recomputing KPIs and announcing the result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use storepulse_core::Clock;
use storepulse_events::{BusError, Event, EventBus, EventHandler, EventType, Payload};

use crate::aggregator::{KpiAggregator, KpiError};
use crate::snapshot::KpiSummary;

pub const KPI_ENTITY_TYPE: &str = "kpi";
/// `kpi_type` of the notification `calculate_all` publishes.
pub const SUMMARY_KPI_TYPE: &str = "kpi_summary";

/// KPI family affected by a mutation; the tag on the `kpi.calculated` event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KpiGroup {
    SalesKpis,
    ProfitMargins,
    CustomerAnalytics,
}

impl KpiGroup {
    pub const ALL: [KpiGroup; 3] = [
        KpiGroup::SalesKpis,
        KpiGroup::ProfitMargins,
        KpiGroup::CustomerAnalytics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KpiGroup::SalesKpis => "sales_kpis",
            KpiGroup::ProfitMargins => "profit_margins",
            KpiGroup::CustomerAnalytics => "customer_analytics",
        }
    }

    /// Mutation events that invalidate this group.
    pub fn triggers(self) -> &'static [EventType] {
        match self {
            KpiGroup::SalesKpis => &[
                EventType::SaleCreated,
                EventType::SaleUpdated,
                EventType::SaleDeleted,
            ],
            KpiGroup::ProfitMargins => &[EventType::ExpenseCreated, EventType::ExpenseUpdated],
            KpiGroup::CustomerAnalytics => {
                &[EventType::CustomerCreated, EventType::CustomerUpdated]
            }
        }
    }

    pub fn for_event(event_type: EventType) -> Option<KpiGroup> {
        KpiGroup::ALL
            .into_iter()
            .find(|group| group.triggers().contains(&event_type))
    }
}

/// Payload of a `kpi.calculated` event.
pub(crate) fn kpi_payload(
    kpi_type: &str,
    trigger_entity_id: Option<&str>,
    calculated_at: DateTime<Utc>,
) -> Payload {
    let mut payload = Payload::new();
    payload.insert("kpi_type".to_string(), Value::from(kpi_type));
    payload.insert(
        "trigger_entity_id".to_string(),
        trigger_entity_id.map_or(Value::Null, Value::from),
    );
    payload.insert(
        "calculated_at".to_string(),
        Value::from(calculated_at.to_rfc3339()),
    );
    payload
}

pub(crate) fn kpi_calculated_event(
    kpi_type: &str,
    payload: Payload,
    calculated_at: DateTime<Utc>,
) -> Event {
    Event::new(
        EventType::KpiCalculated,
        format!("{kpi_type}_{}", calculated_at.to_rfc3339()),
        KPI_ENTITY_TYPE,
        payload,
        calculated_at,
    )
}

/// Stateless subscriber wired at startup.
///
/// Every mutation triggers a full recompute: all KPI cache entries are
/// dropped and the composite for the configured window is rebuilt. Only the
/// group tag on the resulting notification depends on the event.
pub struct RecalculationHandler {
    aggregator: Arc<KpiAggregator>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    window_days: u32,
}

impl RecalculationHandler {
    pub const NAME: &'static str = "kpi_recalculation";

    pub fn new(
        aggregator: Arc<KpiAggregator>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        window_days: u32,
    ) -> Self {
        Self {
            aggregator,
            bus,
            clock,
            window_days,
        }
    }

    /// Subscribe `handler` to every mutation event type it reacts to.
    pub fn register(handler: Arc<Self>, bus: &EventBus) -> Result<(), BusError> {
        for group in KpiGroup::ALL {
            for event_type in group.triggers() {
                bus.subscribe(*event_type, handler.clone())?;
            }
        }
        Ok(())
    }

    /// Recompute and announce `group`, attributing it to `trigger`.
    pub async fn recalculate(&self, group: KpiGroup, trigger: &Event) -> Result<KpiSummary, KpiError> {
        let summary = self.aggregator.refresh_all(self.window_days).await?;

        let now = self.clock.now();
        let payload = kpi_payload(group.as_str(), Some(trigger.entity_id()), now);
        self.bus
            .publish(kpi_calculated_event(group.as_str(), payload, now))
            .await?;

        tracing::info!(
            kpi_type = group.as_str(),
            trigger_event = %trigger.event_type(),
            trigger_entity_id = trigger.entity_id(),
            revenue_cents = summary.revenue.total_revenue.get(),
            "KPIs recalculated"
        );
        Ok(summary)
    }
}

#[async_trait]
impl EventHandler for RecalculationHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(group) = KpiGroup::for_event(event.event_type()) else {
            tracing::debug!(event_type = %event.event_type(), "no KPI group for event; ignored");
            return Ok(());
        };
        self.recalculate(group, event).await?;
        Ok(())
    }
}
