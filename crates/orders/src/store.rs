//! Order storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::status::OrderStatus;

/// One priced line of a persisted order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub book_id: BookId,
    pub quantity: i64,
    pub price: f64,
}

/// A persisted order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub lines: Vec<OrderLineRecord>,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for order aggregates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new pending order with its lines in one transaction and
    /// returns it with its assigned identifier.
    async fn insert_order(
        &self,
        user_id: UserId,
        total_amount: f64,
        lines: &[OrderLineRecord],
    ) -> Result<OrderRecord>;

    /// Fetches an order with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Moves a pending order into the given terminal status.
    ///
    /// Returns `true` when the transition was applied. A missing order or an
    /// order that already left `pending` is a `false` no-op, which makes
    /// redelivered outcome events harmless.
    async fn apply_outcome(&self, id: OrderId, status: OrderStatus) -> Result<bool>;
}
