//! In-process publish/subscribe with an append-only audit log.
//!
//! Delivery is synchronous with the publisher: `publish` appends the event,
//! then awaits each handler for that event type in registration order. No
//! lock is held while a handler runs, so handlers may publish further events.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::FutureExt;

use crate::{Event, EventHandler, EventType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus was shut down; nothing is appended or dispatched.
    #[error("event bus is closed")]
    Closed,

    /// Internal lock poisoning.
    #[error("event bus state poisoned")]
    Poisoned,
}

/// Filter for [`EventBus::get_events`]. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub entity_id: Option<String>,
    pub event_type: Option<EventType>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(entity_id) = &self.entity_id {
            if event.entity_id() != entity_id {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type() != event_type {
                return false;
            }
        }
        true
    }
}

type Subscribers = HashMap<EventType, Vec<Arc<dyn EventHandler>>>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Subscribers>,
    store: RwLock<Vec<Event>>,
    closed: AtomicBool,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("stored_events", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`. Registration order is dispatch order.
    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let mut subs = self.subscribers.write().map_err(|_| BusError::Poisoned)?;
        tracing::debug!(event_type = %event_type, handler = handler.name(), "handler subscribed");
        subs.entry(event_type).or_default().push(handler);
        Ok(())
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .read()
            .map(|subs| subs.get(&event_type).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Append `event` to the log, then run its handlers one after another.
    ///
    /// Handler failures are logged and swallowed; only a closed or poisoned
    /// bus makes this return an error.
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let handlers: Vec<Arc<dyn EventHandler>> = {
            let mut store = self.store.write().map_err(|_| BusError::Poisoned)?;
            store.push(event.clone());

            let subs = self.subscribers.read().map_err(|_| BusError::Poisoned)?;
            subs.get(&event.event_type()).cloned().unwrap_or_default()
        };

        tracing::debug!(
            event_type = %event.event_type(),
            entity_id = event.entity_id(),
            handlers = handlers.len(),
            "event published"
        );

        for handler in handlers {
            let outcome = AssertUnwindSafe(handler.handle(&event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        handler = handler.name(),
                        event_type = %event.event_type(),
                        entity_id = event.entity_id(),
                        "event handler failed: {err:?}"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        handler = handler.name(),
                        event_type = %event.event_type(),
                        entity_id = event.entity_id(),
                        "event handler panicked"
                    );
                }
            }
        }

        Ok(())
    }

    /// Events matching `filter`, oldest first.
    pub fn get_events(&self, filter: &EventFilter) -> Vec<Event> {
        match self.store.read() {
            Ok(store) => store.iter().filter(|e| filter.matches(e)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting events and drop every subscription.
    ///
    /// The audit log stays readable.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut subs) = self.subscribers.write() {
            subs.clear();
        }
        tracing::info!("event bus shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Payload;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn event(event_type: EventType, entity_id: &str) -> Event {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        Event::new(event_type, entity_id, "sale", Payload::new(), ts)
    }

    /// Records the order in which handlers ran.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.entity_id()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            panic!("handler bug")
        }
    }

    /// Publishes a follow-up event from inside dispatch.
    struct Echo {
        bus: Arc<EventBus>,
    }

    #[async_trait]
    impl EventHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn handle(&self, event: &Event) -> anyhow::Result<()> {
            let follow_up = Event::new(
                EventType::KpiCalculated,
                format!("kpi_{}", event.entity_id()),
                "kpi",
                Payload::new(),
                event.timestamp(),
            );
            self.bus.publish(follow_up).await?;
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_appends() {
        let bus = EventBus::new();
        bus.publish(event(EventType::ReportGenerated, "r-1")).await.unwrap();

        let found = bus.get_events(&EventFilter::all().of_type(EventType::ReportGenerated));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id(), "r-1");
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventType::SaleCreated, recorder("first", &log)).unwrap();
        bus.subscribe(EventType::SaleCreated, recorder("second", &log)).unwrap();
        bus.subscribe(EventType::SaleDeleted, recorder("other", &log)).unwrap();

        bus.publish(event(EventType::SaleCreated, "s-1")).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["first:s-1", "second:s-1"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_next_one() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventType::SaleCreated, Arc::new(Failing)).unwrap();
        bus.subscribe(EventType::SaleCreated, Arc::new(Panicking)).unwrap();
        bus.subscribe(EventType::SaleCreated, recorder("survivor", &log)).unwrap();

        let result = bus.publish(event(EventType::SaleCreated, "s-1")).await;

        assert!(result.is_ok());
        assert_eq!(*log.lock().unwrap(), ["survivor:s-1"]);
    }

    #[tokio::test]
    async fn handlers_can_publish_while_dispatching() {
        let bus = Arc::new(EventBus::new());
        bus.subscribe(
            EventType::SaleCreated,
            Arc::new(Echo {
                bus: Arc::clone(&bus),
            }),
        )
        .unwrap();

        bus.publish(event(EventType::SaleCreated, "s-9")).await.unwrap();

        let all = bus.get_events(&EventFilter::all());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type(), EventType::SaleCreated);
        assert_eq!(all[1].entity_id(), "kpi_s-9");
    }

    #[tokio::test]
    async fn get_events_filters_by_entity_and_type() {
        let bus = EventBus::new();
        bus.publish(event(EventType::SaleCreated, "s-1")).await.unwrap();
        bus.publish(event(EventType::SaleUpdated, "s-1")).await.unwrap();
        bus.publish(event(EventType::SaleCreated, "s-2")).await.unwrap();

        assert_eq!(bus.get_events(&EventFilter::all().entity("s-1")).len(), 2);
        let created = bus.get_events(&EventFilter::all().of_type(EventType::SaleCreated));
        assert_eq!(created.len(), 2);
        let both = EventFilter::all().entity("s-1").of_type(EventType::SaleUpdated);
        assert_eq!(bus.get_events(&both).len(), 1);

        // Stable across calls.
        assert_eq!(bus.get_events(&EventFilter::all()), bus.get_events(&EventFilter::all()));
    }

    #[tokio::test]
    async fn shutdown_refuses_publish_and_keeps_log() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventType::SaleCreated, recorder("r", &log)).unwrap();
        bus.publish(event(EventType::SaleCreated, "s-1")).await.unwrap();

        bus.shutdown();

        assert_eq!(
            bus.publish(event(EventType::SaleCreated, "s-2")).await,
            Err(BusError::Closed)
        );
        assert_eq!(bus.subscriber_count(EventType::SaleCreated), 0);
        assert_eq!(bus.len(), 1);
    }
}
