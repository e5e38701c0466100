//! In-memory order store for tests and single-process wiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::Result;
use crate::status::OrderStatus;
use crate::store::{OrderLineRecord, OrderRecord, OrderStore};

/// In-memory order store with sequential identifiers.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, OrderRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(
        &self,
        user_id: UserId,
        total_amount: f64,
        lines: &[OrderLineRecord],
    ) -> Result<OrderRecord> {
        let id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = OrderRecord {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            lines: lines.to_vec(),
            created_at: Utc::now(),
        };
        self.orders.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn apply_outcome(&self, id: OrderId, status: OrderStatus) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BookId;

    fn lines() -> Vec<OrderLineRecord> {
        vec![OrderLineRecord {
            book_id: BookId::new(42),
            quantity: 2,
            price: 9.99,
        }]
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryOrderStore::new();
        let first = store
            .insert_order(UserId::new(1), 19.98, &lines())
            .await
            .unwrap();
        let second = store
            .insert_order(UserId::new(1), 19.98, &lines())
            .await
            .unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn outcome_applies_only_once() {
        let store = InMemoryOrderStore::new();
        let order = store
            .insert_order(UserId::new(1), 19.98, &lines())
            .await
            .unwrap();

        assert!(
            store
                .apply_outcome(order.id, OrderStatus::Reserved)
                .await
                .unwrap()
        );
        // Redelivered outcome, including a contradictory one, is a no-op.
        assert!(
            !store
                .apply_outcome(order.id, OrderStatus::ReservationFailed)
                .await
                .unwrap()
        );

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Reserved);
    }

    #[tokio::test]
    async fn outcome_for_unknown_order_is_a_noop() {
        let store = InMemoryOrderStore::new();
        assert!(
            !store
                .apply_outcome(OrderId::new(404), OrderStatus::Reserved)
                .await
                .unwrap()
        );
    }
}
