//! Reservation engine consuming `stock.reserve.request`.

use async_trait::async_trait;
use messaging::event::REASON_NOT_ENOUGH_STOCK;
use messaging::{
    DecodedEvent, DomainEvent, EventHandler, EventPublisher, HandlerError, MessageBroker,
};

use crate::store::{InventoryStore, ReservationOutcome};

/// Consumes reservation requests, decides them atomically against the
/// inventory store and publishes the outcome under the request's
/// idempotency key.
///
/// Insufficient stock is a first-class outcome, never a handler failure.
/// Only store and transport errors bubble up, so redelivery retries exactly
/// the cases where retrying can help.
pub struct ReservationEngine<S, B> {
    store: S,
    publisher: EventPublisher<B>,
}

impl<S, B> ReservationEngine<S, B>
where
    S: InventoryStore,
    B: MessageBroker,
{
    /// Creates an engine over the given store and publisher.
    pub fn new(store: S, publisher: EventPublisher<B>) -> Self {
        Self { store, publisher }
    }
}

#[async_trait]
impl<S, B> EventHandler for ReservationEngine<S, B>
where
    S: InventoryStore,
    B: MessageBroker,
{
    #[tracing::instrument(skip(self, event), fields(key = %event.envelope.idempotency_key))]
    async fn handle(&self, event: &DecodedEvent) -> std::result::Result<(), HandlerError> {
        let DomainEvent::StockReserveRequested(request) = &event.event else {
            return Ok(());
        };
        let key = &event.envelope.idempotency_key;

        let outcome = self
            .store
            .reserve(key, &request.items)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        let outcome_event = match outcome {
            ReservationOutcome::Reserved => {
                metrics::counter!("reservations_succeeded_total").increment(1);
                tracing::info!(order_id = %request.order_id, "reservation succeeded");
                DomainEvent::reserve_succeeded(request.clone())
            }
            ReservationOutcome::Rejected { reason } => {
                metrics::counter!("reservations_rejected_total").increment(1);
                tracing::info!(order_id = %request.order_id, reason, "reservation rejected");
                DomainEvent::reserve_failed(reason, request.clone())
            }
            ReservationOutcome::AlreadyProcessed { succeeded } => {
                metrics::counter!("reservations_replayed_total").increment(1);
                tracing::info!(order_id = %request.order_id, succeeded, "replaying recorded outcome");
                if succeeded {
                    DomainEvent::reserve_succeeded(request.clone())
                } else {
                    DomainEvent::reserve_failed(REASON_NOT_ENOUGH_STOCK, request.clone())
                }
            }
        };

        self.publisher
            .publish(&outcome_event, Some(key.clone()))
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryInventoryStore;
    use common::{BookId, IdempotencyKey, OrderId, UserId};
    use messaging::{
        EVENTS_TOPIC, Envelope, InMemoryBroker, OrderLine, OrderPayload, Subscription, routing,
    };

    fn request(quantity: i64) -> OrderPayload {
        OrderPayload {
            order_id: OrderId::new(7),
            user_id: UserId::new(3),
            total_amount: 42.0,
            items: vec![OrderLine::new(BookId::new(42), quantity)],
        }
    }

    fn decoded(payload: OrderPayload, key: &IdempotencyKey) -> DecodedEvent {
        let event = DomainEvent::StockReserveRequested(payload);
        let envelope = Envelope::with_key(key.clone(), event.to_payload().unwrap());
        DecodedEvent {
            routing_key: routing::STOCK_RESERVE_REQUEST.to_string(),
            envelope,
            event,
        }
    }

    async fn setup(
        stock: i64,
    ) -> (
        ReservationEngine<InMemoryInventoryStore, InMemoryBroker>,
        InMemoryInventoryStore,
        Box<dyn Subscription>,
    ) {
        let broker = InMemoryBroker::new();
        let publisher = EventPublisher::bind(broker.clone(), EVENTS_TOPIC).await.unwrap();
        let outcomes = broker
            .bind_queue(
                EVENTS_TOPIC,
                &[routing::STOCK_RESERVE_SUCCEEDED, routing::STOCK_RESERVE_FAILED],
            )
            .await
            .unwrap();

        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), stock).await.unwrap();
        let engine = ReservationEngine::new(store.clone(), publisher);
        (engine, store, outcomes)
    }

    async fn next_outcome(sub: &mut Box<dyn Subscription>) -> (DomainEvent, IdempotencyKey) {
        let delivery = sub.next_delivery().await.unwrap().unwrap();
        let envelope = Envelope::decode(&delivery.body).unwrap();
        let event = DomainEvent::decode(&delivery.routing_key, &envelope.payload).unwrap();
        delivery.acker.ack().await.unwrap();
        (event, envelope.idempotency_key)
    }

    #[tokio::test]
    async fn satisfiable_request_publishes_succeeded() {
        let (engine, store, mut outcomes) = setup(5).await;
        let key = IdempotencyKey::new("req-1");

        engine.handle(&decoded(request(2), &key)).await.unwrap();

        let (event, outcome_key) = next_outcome(&mut outcomes).await;
        let DomainEvent::StockReserveSucceeded(payload) = event else {
            panic!("expected succeeded, got {event:?}");
        };
        assert_eq!(payload.original.order_id, OrderId::new(7));
        assert_eq!(outcome_key, key);
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn short_stock_publishes_failed_with_reason() {
        let (engine, store, mut outcomes) = setup(1).await;
        let key = IdempotencyKey::new("req-1");

        engine.handle(&decoded(request(2), &key)).await.unwrap();

        let (event, outcome_key) = next_outcome(&mut outcomes).await;
        let DomainEvent::StockReserveFailed(payload) = event else {
            panic!("expected failed, got {event:?}");
        };
        assert_eq!(payload.reason, REASON_NOT_ENOUGH_STOCK);
        assert_eq!(payload.original.items[0].quantity, 2);
        assert_eq!(outcome_key, key);
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn redelivered_request_republishes_without_double_decrement() {
        let (engine, store, mut outcomes) = setup(5).await;
        let key = IdempotencyKey::new("req-1");

        engine.handle(&decoded(request(2), &key)).await.unwrap();
        engine.handle(&decoded(request(2), &key)).await.unwrap();

        for _ in 0..2 {
            let (event, outcome_key) = next_outcome(&mut outcomes).await;
            assert!(matches!(event, DomainEvent::StockReserveSucceeded(_)));
            assert_eq!(outcome_key, key);
        }
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let (engine, store, _outcomes) = setup(5).await;
        let key = IdempotencyKey::new("req-1");

        let event = DomainEvent::OrderCreated(request(2));
        let envelope = Envelope::with_key(key, event.to_payload().unwrap());
        let decoded = DecodedEvent {
            routing_key: routing::ORDER_CREATED.to_string(),
            envelope,
            event,
        };

        engine.handle(&decoded).await.unwrap();
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn broker_failure_is_a_retriable_handler_error() {
        let broker = InMemoryBroker::new();
        let publisher = EventPublisher::bind(broker.clone(), EVENTS_TOPIC).await.unwrap();
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 5).await.unwrap();
        let engine = ReservationEngine::new(store, publisher);

        broker.close();

        let key = IdempotencyKey::new("req-1");
        let result = engine.handle(&decoded(request(2), &key)).await;
        assert!(result.is_err());
    }
}
