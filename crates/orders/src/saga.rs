//! Order creation: the initiating step of the fulfillment choreography.

use common::{BookId, UserId};
use messaging::{DomainEvent, EventPublisher, MessageBroker, OrderLine, OrderPayload};

use crate::Result;
use crate::error::OrdersError;
use crate::pricing::PriceLookup;
use crate::store::{OrderLineRecord, OrderRecord, OrderStore};

/// One requested `(book, quantity)` line of a new order, before pricing.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderLine {
    pub book_id: BookId,
    pub quantity: i64,
}

impl NewOrderLine {
    /// Creates a new order line request.
    pub fn new(book_id: BookId, quantity: i64) -> Self {
        Self { book_id, quantity }
    }
}

/// Starts the order fulfillment saga.
///
/// Creation is fire-and-forget: the initiator persists the pending order,
/// announces it, requests the reservation and returns. The loop is closed
/// asynchronously by [`crate::ReservationOutcomeHandler`] when the outcome
/// event arrives.
pub struct OrderSagaInitiator<S, P, B> {
    store: S,
    pricing: P,
    publisher: EventPublisher<B>,
}

impl<S, P, B> OrderSagaInitiator<S, P, B>
where
    S: OrderStore,
    P: PriceLookup,
    B: MessageBroker,
{
    /// Creates an initiator over the given store, price lookup and publisher.
    pub fn new(store: S, pricing: P, publisher: EventPublisher<B>) -> Self {
        Self {
            store,
            pricing,
            publisher,
        }
    }

    /// Validates, prices and persists a new order, then publishes
    /// `order.created` followed by `stock.reserve.request` under one shared
    /// idempotency key.
    ///
    /// A failed price lookup aborts before anything is persisted or
    /// published. Events go out only after the local transaction commits.
    #[tracing::instrument(skip(self, lines), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        lines: &[NewOrderLine],
    ) -> Result<OrderRecord> {
        if lines.is_empty() {
            return Err(OrdersError::EmptyOrder);
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(OrdersError::InvalidQuantity {
                    book_id: line.book_id,
                    quantity: line.quantity,
                });
            }
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut total_amount = 0.0;
        for line in lines {
            let price = self.pricing.price(line.book_id).await?;
            total_amount += price * line.quantity as f64;
            priced.push(OrderLineRecord {
                book_id: line.book_id,
                quantity: line.quantity,
                price,
            });
        }

        let order = self.store.insert_order(user_id, total_amount, &priced).await?;

        let payload = OrderPayload {
            order_id: order.id,
            user_id,
            total_amount,
            items: lines
                .iter()
                .map(|line| OrderLine::new(line.book_id, line.quantity))
                .collect(),
        };

        let key = self
            .publisher
            .publish(&DomainEvent::OrderCreated(payload.clone()), None)
            .await?;
        self.publisher
            .publish(&DomainEvent::StockReserveRequested(payload), Some(key.clone()))
            .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total_amount, %key, "order created");

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderStore;
    use crate::pricing::InMemoryPriceLookup;
    use crate::status::OrderStatus;
    use common::OrderId;
    use messaging::{EVENTS_TOPIC, Envelope, InMemoryBroker, Subscription, routing};

    async fn setup() -> (
        OrderSagaInitiator<InMemoryOrderStore, InMemoryPriceLookup, InMemoryBroker>,
        InMemoryOrderStore,
        Box<dyn Subscription>,
    ) {
        let broker = InMemoryBroker::new();
        let publisher = EventPublisher::bind(broker.clone(), EVENTS_TOPIC).await.unwrap();
        let events = broker
            .bind_queue(
                EVENTS_TOPIC,
                &[routing::ORDER_CREATED, routing::STOCK_RESERVE_REQUEST],
            )
            .await
            .unwrap();

        let mut pricing = InMemoryPriceLookup::new();
        pricing.set_price(BookId::new(42), 9.99);
        pricing.set_price(BookId::new(7), 25.0);

        let store = InMemoryOrderStore::new();
        let initiator = OrderSagaInitiator::new(store.clone(), pricing, publisher);
        (initiator, store, events)
    }

    #[tokio::test]
    async fn create_order_persists_pending_and_publishes_both_events() {
        let (initiator, store, mut events) = setup().await;

        let order = initiator
            .create_order(
                UserId::new(3),
                &[
                    NewOrderLine::new(BookId::new(42), 2),
                    NewOrderLine::new(BookId::new(7), 1),
                ],
            )
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!((order.total_amount - 44.98).abs() < 1e-9);
        assert_eq!(order.lines[0].price, 9.99);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        // order.created first, then the reservation request, one shared key.
        let created = events.next_delivery().await.unwrap().unwrap();
        assert_eq!(created.routing_key, routing::ORDER_CREATED);
        let created_env = Envelope::decode(&created.body).unwrap();
        created.acker.ack().await.unwrap();

        let request = events.next_delivery().await.unwrap().unwrap();
        assert_eq!(request.routing_key, routing::STOCK_RESERVE_REQUEST);
        let request_env = Envelope::decode(&request.body).unwrap();
        request.acker.ack().await.unwrap();

        assert_eq!(created_env.idempotency_key, request_env.idempotency_key);
        assert_eq!(created_env.payload["order_id"], order.id.as_i64());
        assert_eq!(created_env.payload["items"][0]["quantity"], 2);
    }

    #[tokio::test]
    async fn empty_order_is_rejected() {
        let (initiator, _store, _events) = setup().await;
        let result = initiator.create_order(UserId::new(3), &[]).await;
        assert!(matches!(result, Err(OrdersError::EmptyOrder)));
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let (initiator, store, _events) = setup().await;

        let result = initiator
            .create_order(UserId::new(3), &[NewOrderLine::new(BookId::new(42), 0)])
            .await;

        assert!(matches!(result, Err(OrdersError::InvalidQuantity { .. })));
        assert!(store.get_order(OrderId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_price_lookup_aborts_before_persisting_or_publishing() {
        let (initiator, store, _events) = setup().await;

        let result = initiator
            .create_order(
                UserId::new(3),
                &[
                    NewOrderLine::new(BookId::new(42), 1),
                    NewOrderLine::new(BookId::new(404), 1),
                ],
            )
            .await;

        assert!(matches!(result, Err(OrdersError::PriceLookup { .. })));
        assert!(store.get_order(OrderId::new(1)).await.unwrap().is_none());
    }
}
