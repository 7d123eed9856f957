use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::EventType;

/// Event payload: an insertion-ordered key/value map.
pub type Payload = Map<String, Value>;

/// Source tag stamped on events unless the publisher overrides it.
pub const DEFAULT_SOURCE: &str = "analytics";

/// Envelope for a published event.
///
/// Immutable once built: fields are private and only readable through
/// accessors. This is the unit the bus appends to its log and hands to
/// handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_id: Uuid,
    event_type: EventType,

    /// Identifier of the record the event is about (sale id, customer id, ...).
    entity_id: String,
    entity_type: String,

    payload: Payload,
    timestamp: DateTime<Utc>,
    source: String,
}

impl Event {
    pub fn new(
        event_type: EventType,
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        payload: Payload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            payload,
            timestamp,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Convenience lookup of a string field in the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn payload_keeps_insertion_order() {
        let mut payload = Payload::new();
        payload.insert("product_name".into(), json!("Coffee"));
        payload.insert("amount_cents".into(), json!(599));
        payload.insert("customer_id".into(), json!("CUST001"));

        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let event = Event::new(EventType::SaleCreated, "s-1", "sale", payload, ts);

        let keys: Vec<&str> = event.payload().keys().map(String::as_str).collect();
        assert_eq!(keys, ["product_name", "amount_cents", "customer_id"]);
        assert_eq!(event.payload_str("product_name"), Some("Coffee"));
        assert_eq!(event.source(), DEFAULT_SOURCE);
    }

    #[test]
    fn json_form_uses_dotted_event_type() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let event = Event::new(EventType::KpiCalculated, "kpi_1", "kpi", Payload::new(), ts)
            .with_source("scheduler");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], json!("kpi.calculated"));
        assert_eq!(value["source"], json!("scheduler"));
    }
}
