use std::sync::Arc;

use storepulse_core::{Clock, SaleId};
use storepulse_events::{EventBus, EventType};
use storepulse_records::{NewSale, Sale, SalePatch};

use super::{RecordEvents, ServiceError};
use crate::store::RecordStore;

/// Create/update/delete sales and announce each change on the bus.
pub struct SalesService {
    store: Arc<dyn RecordStore>,
    events: RecordEvents,
}

impl SalesService {
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events: RecordEvents::new(bus, clock),
        }
    }

    #[tracing::instrument(skip(self, input), fields(product = %input.product_name), err)]
    pub async fn create(&self, input: NewSale) -> Result<Sale, ServiceError> {
        let sale = input.into_sale(SaleId::new(), self.events.now())?;
        self.store.insert_sale(&sale).await?;
        self.events
            .emit(EventType::SaleCreated, sale.id.to_string(), Sale::ENTITY_TYPE, &sale)
            .await?;
        Ok(sale)
    }

    #[tracing::instrument(skip(self, patch), err)]
    pub async fn update(&self, id: SaleId, patch: SalePatch) -> Result<Sale, ServiceError> {
        let mut sale = self
            .store
            .get_sale(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {id}")))?;
        if patch.is_empty() {
            return Ok(sale);
        }
        patch.apply_to(&mut sale)?;
        self.store.update_sale(&sale).await?;
        self.events
            .emit(EventType::SaleUpdated, sale.id.to_string(), Sale::ENTITY_TYPE, &sale)
            .await?;
        Ok(sale)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, id: SaleId) -> Result<Sale, ServiceError> {
        let sale = self.store.delete_sale(id).await?;
        self.events
            .emit_deleted(EventType::SaleDeleted, sale.id.to_string(), Sale::ENTITY_TYPE, &sale)
            .await?;
        Ok(sale)
    }

    pub async fn get(&self, id: SaleId) -> Result<Option<Sale>, ServiceError> {
        Ok(self.store.get_sale(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use chrono::{TimeZone, Utc};
    use storepulse_core::{Cents, CustomerId, ManualClock};
    use storepulse_events::EventFilter;

    fn service() -> (Arc<EventBus>, SalesService) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 20, 10, 0, 0).unwrap(),
        ));
        let bus = Arc::new(EventBus::new());
        let service = SalesService::new(Arc::new(InMemoryRecordStore::new()), bus.clone(), clock);
        (bus, service)
    }

    fn coffee() -> NewSale {
        NewSale::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            "Coffee",
            Cents::new(599),
        )
        .with_customer(CustomerId::new("CUST001").unwrap())
    }

    #[tokio::test]
    async fn create_commits_then_publishes_record() {
        let (bus, service) = service();
        let sale = service.create(coffee()).await.unwrap();

        assert_eq!(service.get(sale.id).await.unwrap(), Some(sale.clone()));

        let events = bus.get_events(&EventFilter::all().of_type(EventType::SaleCreated));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_id(), sale.id.to_string());
        assert_eq!(events[0].entity_type(), "sale");
        assert_eq!(events[0].payload_str("product_name"), Some("Coffee"));
        assert_eq!(events[0].payload()["amount_cents"], serde_json::json!(599));
    }

    #[tokio::test]
    async fn invalid_sale_is_neither_stored_nor_published() {
        let (bus, service) = service();
        let mut input = coffee();
        input.amount_cents = Cents::new(-5);
        assert!(matches!(service.create(input).await, Err(ServiceError::Validation(_))));
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_publish_their_events() {
        let (bus, service) = service();
        let sale = service.create(coffee()).await.unwrap();

        let updated = service
            .update(
                sale.id,
                SalePatch {
                    amount_cents: Some(Cents::new(650)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount_cents, Cents::new(650));

        service.delete(sale.id).await.unwrap();
        assert_eq!(service.get(sale.id).await.unwrap(), None);

        let types: Vec<_> = bus
            .get_events(&EventFilter::all().entity(sale.id.to_string()))
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            [EventType::SaleCreated, EventType::SaleUpdated, EventType::SaleDeleted]
        );
    }

    #[tokio::test]
    async fn missing_sale_is_not_found() {
        let (_, service) = service();
        let err = service.delete(SaleId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
