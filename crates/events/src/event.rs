use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable event type tags.
///
/// The wire form (see [`EventType::as_str`]) is what gets logged and
/// serialized; downstream consumers match on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum EventType {
    SaleCreated,
    SaleUpdated,
    SaleDeleted,
    CustomerCreated,
    CustomerUpdated,
    ExpenseCreated,
    ExpenseUpdated,
    KpiCalculated,
    ReportGenerated,
    DataSyncRequested,
    DataSyncCompleted,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::SaleCreated,
        EventType::SaleUpdated,
        EventType::SaleDeleted,
        EventType::CustomerCreated,
        EventType::CustomerUpdated,
        EventType::ExpenseCreated,
        EventType::ExpenseUpdated,
        EventType::KpiCalculated,
        EventType::ReportGenerated,
        EventType::DataSyncRequested,
        EventType::DataSyncCompleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::SaleCreated => "sale.created",
            EventType::SaleUpdated => "sale.updated",
            EventType::SaleDeleted => "sale.deleted",
            EventType::CustomerCreated => "customer.created",
            EventType::CustomerUpdated => "customer.updated",
            EventType::ExpenseCreated => "expense.created",
            EventType::ExpenseUpdated => "expense.updated",
            EventType::KpiCalculated => "kpi.calculated",
            EventType::ReportGenerated => "report.generated",
            EventType::DataSyncRequested => "data.sync.requested",
            EventType::DataSyncCompleted => "data.sync.completed",
        }
    }

    /// True for events emitted by the record mutation services.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            EventType::SaleCreated
                | EventType::SaleUpdated
                | EventType::SaleDeleted
                | EventType::CustomerCreated
                | EventType::CustomerUpdated
                | EventType::ExpenseCreated
                | EventType::ExpenseUpdated
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventType> for &'static str {
    fn from(value: EventType) -> Self {
        value.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

impl TryFrom<String> for EventType {
    type Error = UnknownEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_parse_back() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("sale.exploded".parse::<EventType>().is_err());
    }

    #[test]
    fn serializes_as_dotted_tag() {
        let json = serde_json::to_string(&EventType::DataSyncRequested).unwrap();
        assert_eq!(json, "\"data.sync.requested\"");
        let back: EventType = serde_json::from_str("\"kpi.calculated\"").unwrap();
        assert_eq!(back, EventType::KpiCalculated);
    }

    #[test]
    fn only_record_changes_are_mutations() {
        assert!(EventType::SaleDeleted.is_mutation());
        assert!(EventType::ExpenseUpdated.is_mutation());
        assert!(!EventType::KpiCalculated.is_mutation());
        assert!(!EventType::DataSyncCompleted.is_mutation());
    }
}
