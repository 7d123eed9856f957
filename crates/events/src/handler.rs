use std::sync::Arc;

use async_trait::async_trait;

use crate::Event;

/// Reacts to published events.
///
/// One execution contract for every subscriber: the bus awaits `handle` in
/// registration order. Returning `Err` (or panicking) is logged by the bus
/// and does not affect other handlers or the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<H> EventHandler for Arc<H>
where
    H: EventHandler + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (**self).handle(event).await
    }
}
