//! Typed domain events, one variant per routing key.

use common::{BookId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Name of the shared durable topic exchange all services publish to.
pub const EVENTS_TOPIC: &str = "bookstore.events";

/// Routing keys used on the shared topic exchange.
pub mod routing {
    /// An order aggregate was created.
    pub const ORDER_CREATED: &str = "order.created";
    /// A reservation of stock was requested for an order.
    pub const STOCK_RESERVE_REQUEST: &str = "stock.reserve.request";
    /// The whole reservation succeeded and stock was decremented.
    pub const STOCK_RESERVE_SUCCEEDED: &str = "stock.reserve.succeeded";
    /// The reservation was rejected; no stock changed.
    pub const STOCK_RESERVE_FAILED: &str = "stock.reserve.failed";
    /// Destination for messages that exhausted their retry budget.
    pub const DEAD_LETTER: &str = "events.dead_letter";

    /// All domain routing keys, in publish order of the happy path.
    pub const ALL: [&str; 4] = [
        ORDER_CREATED,
        STOCK_RESERVE_REQUEST,
        STOCK_RESERVE_SUCCEEDED,
        STOCK_RESERVE_FAILED,
    ];
}

/// Reason code reported when a reservation cannot be satisfied.
pub const REASON_NOT_ENOUGH_STOCK: &str = "not_enough_stock";

/// One `(book, quantity)` line of an order or reservation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub book_id: BookId,
    pub quantity: i64,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(book_id: BookId, quantity: i64) -> Self {
        Self { book_id, quantity }
    }
}

/// Payload shared by `order.created` and `stock.reserve.request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: f64,
    pub items: Vec<OrderLine>,
}

/// Payload of `stock.reserve.succeeded`, echoing the original request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveSucceededPayload {
    pub original: OrderPayload,
}

/// Payload of `stock.reserve.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveFailedPayload {
    pub reason: String,
    pub original: OrderPayload,
}

/// The closed set of events flowing over the shared topic.
///
/// Decoding goes through [`DomainEvent::decode`], which maps a routing key to
/// its variant so consumers get compile-time exhaustiveness over outcome
/// handling instead of dispatching on raw strings.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    OrderCreated(OrderPayload),
    StockReserveRequested(OrderPayload),
    StockReserveSucceeded(ReserveSucceededPayload),
    StockReserveFailed(ReserveFailedPayload),
}

impl DomainEvent {
    /// Returns the routing key this event is published under.
    pub fn routing_key(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => routing::ORDER_CREATED,
            DomainEvent::StockReserveRequested(_) => routing::STOCK_RESERVE_REQUEST,
            DomainEvent::StockReserveSucceeded(_) => routing::STOCK_RESERVE_SUCCEEDED,
            DomainEvent::StockReserveFailed(_) => routing::STOCK_RESERVE_FAILED,
        }
    }

    /// Serializes the event payload for the envelope.
    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            DomainEvent::OrderCreated(p) | DomainEvent::StockReserveRequested(p) => {
                serde_json::to_value(p)
            }
            DomainEvent::StockReserveSucceeded(p) => serde_json::to_value(p),
            DomainEvent::StockReserveFailed(p) => serde_json::to_value(p),
        }
    }

    /// Decodes a payload into the variant matching its routing key.
    pub fn decode(
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, DecodeError> {
        let schema_err = |source| DecodeError::PayloadSchema {
            routing_key: routing_key.to_string(),
            source,
        };

        match routing_key {
            routing::ORDER_CREATED => serde_json::from_value(payload.clone())
                .map(DomainEvent::OrderCreated)
                .map_err(schema_err),
            routing::STOCK_RESERVE_REQUEST => serde_json::from_value(payload.clone())
                .map(DomainEvent::StockReserveRequested)
                .map_err(schema_err),
            routing::STOCK_RESERVE_SUCCEEDED => serde_json::from_value(payload.clone())
                .map(DomainEvent::StockReserveSucceeded)
                .map_err(schema_err),
            routing::STOCK_RESERVE_FAILED => serde_json::from_value(payload.clone())
                .map(DomainEvent::StockReserveFailed)
                .map_err(schema_err),
            other => Err(DecodeError::UnknownRoutingKey(other.to_string())),
        }
    }

    /// Creates a reservation-failed event echoing the original request.
    pub fn reserve_failed(reason: impl Into<String>, original: OrderPayload) -> Self {
        DomainEvent::StockReserveFailed(ReserveFailedPayload {
            reason: reason.into(),
            original,
        })
    }

    /// Creates a reservation-succeeded event echoing the original request.
    pub fn reserve_succeeded(original: OrderPayload) -> Self {
        DomainEvent::StockReserveSucceeded(ReserveSucceededPayload { original })
    }
}
