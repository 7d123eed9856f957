use std::sync::Arc;

use storepulse_core::{Clock, CustomerId};
use storepulse_events::{EventBus, EventType};
use storepulse_records::{Customer, CustomerPatch, NewCustomer};

use super::{RecordEvents, ServiceError};
use crate::store::RecordStore;

/// Customer mutations. Removal is announced as `customer.updated` with
/// `"deleted": true`.
pub struct CustomersService {
    store: Arc<dyn RecordStore>,
    events: RecordEvents,
}

impl CustomersService {
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events: RecordEvents::new(bus, clock),
        }
    }

    /// Fails with [`ServiceError::Conflict`] if the id is already registered.
    #[tracing::instrument(skip(self, input), fields(customer_id = %input.id), err)]
    pub async fn create(&self, input: NewCustomer) -> Result<Customer, ServiceError> {
        let customer = input.into_customer(self.events.now())?;
        self.store.insert_customer(&customer).await?;
        self.events
            .emit(
                EventType::CustomerCreated,
                customer.id.to_string(),
                Customer::ENTITY_TYPE,
                &customer,
            )
            .await?;
        Ok(customer)
    }

    #[tracing::instrument(skip(self, patch), err)]
    pub async fn update(
        &self,
        id: &CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, ServiceError> {
        let mut customer = self
            .store
            .get_customer(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {id}")))?;
        patch.apply_to(&mut customer)?;
        self.store.update_customer(&customer).await?;
        self.events
            .emit(
                EventType::CustomerUpdated,
                customer.id.to_string(),
                Customer::ENTITY_TYPE,
                &customer,
            )
            .await?;
        Ok(customer)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, id: &CustomerId) -> Result<Customer, ServiceError> {
        let customer = self.store.delete_customer(id).await?;
        self.events
            .emit_deleted(
                EventType::CustomerUpdated,
                customer.id.to_string(),
                Customer::ENTITY_TYPE,
                &customer,
            )
            .await?;
        Ok(customer)
    }

    pub async fn get(&self, id: &CustomerId) -> Result<Option<Customer>, ServiceError> {
        Ok(self.store.get_customer(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use storepulse_core::SystemClock;
    use storepulse_events::EventFilter;

    fn service() -> (Arc<EventBus>, CustomersService) {
        let bus = Arc::new(EventBus::new());
        let service = CustomersService::new(
            Arc::new(InMemoryRecordStore::new()),
            bus.clone(),
            Arc::new(SystemClock),
        );
        (bus, service)
    }

    fn john() -> NewCustomer {
        NewCustomer::new(CustomerId::new("CUST001").unwrap())
            .with_name("John Doe")
            .with_email("john@example.com")
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let (bus, service) = service();
        service.create(john()).await.unwrap();
        let err = service.create(john()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(bus.len(), 1);
    }

    #[tokio::test]
    async fn update_publishes_new_state() {
        let (bus, service) = service();
        let customer = service.create(john()).await.unwrap();
        service
            .update(
                &customer.id,
                CustomerPatch {
                    name: Some(Some("John Q. Doe".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updates = bus.get_events(&EventFilter::all().of_type(EventType::CustomerUpdated));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entity_id(), "CUST001");
        assert_eq!(updates[0].payload_str("name"), Some("John Q. Doe"));
    }

    #[tokio::test]
    async fn delete_is_announced_as_update() {
        let (bus, service) = service();
        service.create(john()).await.unwrap();
        let id = CustomerId::new("CUST001").unwrap();
        service.delete(&id).await.unwrap();
        assert_eq!(service.get(&id).await.unwrap(), None);

        let last = bus.get_events(&EventFilter::all().entity("CUST001")).pop().unwrap();
        assert_eq!(last.event_type(), EventType::CustomerUpdated);
        assert_eq!(last.payload()["deleted"], serde_json::json!(true));
    }
}
