//! Domain events and the in-process event bus.
//!
//! Mutation services publish an [`Event`] after committing a record; the
//! [`EventBus`] keeps every published event in an append-only log and
//! dispatches it to the [`EventHandler`]s registered for its [`EventType`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;

pub use bus::{BusError, EventBus, EventFilter};
pub use envelope::{DEFAULT_SOURCE, Event, Payload};
pub use event::{EventType, UnknownEventType};
pub use handler::EventHandler;
