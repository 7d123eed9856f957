use std::sync::Arc;

use storepulse_core::{Clock, ExpenseId};
use storepulse_events::{EventBus, EventType};
use storepulse_records::{Expense, ExpensePatch, NewExpense};

use super::{RecordEvents, ServiceError};
use crate::store::RecordStore;

/// Expense mutations.
///
/// There is no `expense.deleted` event type; a removal is announced as
/// `expense.updated` with `"deleted": true` in the payload.
pub struct ExpensesService {
    store: Arc<dyn RecordStore>,
    events: RecordEvents,
}

impl ExpensesService {
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events: RecordEvents::new(bus, clock),
        }
    }

    #[tracing::instrument(skip(self, input), err)]
    pub async fn create(&self, input: NewExpense) -> Result<Expense, ServiceError> {
        let expense = input.into_expense(ExpenseId::new(), self.events.now())?;
        self.store.insert_expense(&expense).await?;
        self.events
            .emit(
                EventType::ExpenseCreated,
                expense.id.to_string(),
                Expense::ENTITY_TYPE,
                &expense,
            )
            .await?;
        Ok(expense)
    }

    #[tracing::instrument(skip(self, patch), err)]
    pub async fn update(&self, id: ExpenseId, patch: ExpensePatch) -> Result<Expense, ServiceError> {
        let mut expense = self
            .store
            .get_expense(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("expense {id}")))?;
        patch.apply_to(&mut expense)?;
        self.store.update_expense(&expense).await?;
        self.events
            .emit(
                EventType::ExpenseUpdated,
                expense.id.to_string(),
                Expense::ENTITY_TYPE,
                &expense,
            )
            .await?;
        Ok(expense)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, id: ExpenseId) -> Result<Expense, ServiceError> {
        let expense = self.store.delete_expense(id).await?;
        self.events
            .emit_deleted(
                EventType::ExpenseUpdated,
                expense.id.to_string(),
                Expense::ENTITY_TYPE,
                &expense,
            )
            .await?;
        Ok(expense)
    }

    pub async fn get(&self, id: ExpenseId) -> Result<Option<Expense>, ServiceError> {
        Ok(self.store.get_expense(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use chrono::{TimeZone, Utc};
    use storepulse_core::{Cents, SystemClock};
    use storepulse_events::EventFilter;

    #[tokio::test]
    async fn delete_is_announced_as_update() {
        let bus = Arc::new(EventBus::new());
        let service = ExpensesService::new(
            Arc::new(InMemoryRecordStore::new()),
            bus.clone(),
            Arc::new(SystemClock),
        );
        let expense = service
            .create(
                NewExpense::new(
                    Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
                    "Milk delivery",
                    Cents::new(2_000),
                )
                .with_category("Supplies"),
            )
            .await
            .unwrap();

        service.delete(expense.id).await.unwrap();

        let events = bus.get_events(&EventFilter::all().entity(expense.id.to_string()));
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type(), EventType::ExpenseUpdated);
        assert_eq!(events[1].payload()["deleted"], serde_json::json!(true));
        assert_eq!(events[1].payload_str("category"), Some("Supplies"));
    }
}
