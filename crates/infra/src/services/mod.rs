//! Mutation services for sales, expenses and customers.
//!
//! Every mutation commits through the [`RecordStore`](crate::store::RecordStore)
//! first and only then publishes its event, so a subscriber that queries the
//! store in response always sees the committed row.

pub mod customers;
pub mod expenses;
pub mod sales;

pub use customers::CustomersService;
pub use expenses::ExpensesService;
pub use sales::SalesService;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use storepulse_core::{Clock, DomainError};
use storepulse_events::{BusError, Event, EventBus, EventType, Payload};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),

    /// The record was committed but its event could not be published.
    #[error("record committed but event not published: {0}")]
    Publish(#[from] BusError),

    #[error("failed to encode event payload: {0}")]
    Payload(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(what) => ServiceError::Conflict(what),
            other => ServiceError::Store(other),
        }
    }
}

/// Publishes record events with a consistent envelope.
#[derive(Debug, Clone)]
pub(crate) struct RecordEvents {
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl RecordEvents {
    pub(crate) fn new(bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { bus, clock }
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Publish `record` (serialized) as the payload of `event_type`.
    pub(crate) async fn emit<T: Serialize>(
        &self,
        event_type: EventType,
        entity_id: String,
        entity_type: &str,
        record: &T,
    ) -> Result<(), ServiceError> {
        let payload = payload_of(record)?;
        self.publish(event_type, entity_id, entity_type, payload).await
    }

    /// Publish a removal. The payload is the last state plus `"deleted": true`.
    pub(crate) async fn emit_deleted<T: Serialize>(
        &self,
        event_type: EventType,
        entity_id: String,
        entity_type: &str,
        record: &T,
    ) -> Result<(), ServiceError> {
        let mut payload = payload_of(record)?;
        payload.insert("deleted".to_string(), Value::Bool(true));
        self.publish(event_type, entity_id, entity_type, payload).await
    }

    async fn publish(
        &self,
        event_type: EventType,
        entity_id: String,
        entity_type: &str,
        payload: Payload,
    ) -> Result<(), ServiceError> {
        let event = Event::new(event_type, entity_id, entity_type, payload, self.clock.now());
        self.bus.publish(event).await?;
        Ok(())
    }
}

fn payload_of<T: Serialize>(record: &T) -> Result<Payload, ServiceError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ServiceError::Payload(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(err) => Err(ServiceError::Payload(err.to_string())),
    }
}
