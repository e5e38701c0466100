//! In-memory inventory store for tests and single-process wiring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{BookId, IdempotencyKey};
use messaging::{OrderLine, event::REASON_NOT_ENOUGH_STOCK};
use tokio::sync::RwLock;

use crate::Result;
use crate::store::{InventoryStore, ReservationOutcome, merge_lines};

#[derive(Default)]
struct State {
    stock: HashMap<BookId, i64>,
    reservations: HashMap<String, bool>,
}

/// In-memory inventory store.
///
/// A single write lock over the whole state stands in for the row locks the
/// PostgreSQL store takes, which gives `reserve` the same serialization
/// guarantee.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryInventoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn set_stock(&self, book_id: BookId, quantity: i64) -> Result<()> {
        self.state.write().await.stock.insert(book_id, quantity);
        Ok(())
    }

    async fn stock_level(&self, book_id: BookId) -> Result<Option<i64>> {
        Ok(self.state.read().await.stock.get(&book_id).copied())
    }

    async fn reserve(
        &self,
        key: &IdempotencyKey,
        lines: &[OrderLine],
    ) -> Result<ReservationOutcome> {
        let mut state = self.state.write().await;

        if let Some(&succeeded) = state.reservations.get(key.as_str()) {
            return Ok(ReservationOutcome::AlreadyProcessed { succeeded });
        }

        let merged = merge_lines(lines).filter(|merged| {
            merged.iter().all(|line| {
                state
                    .stock
                    .get(&line.book_id)
                    .is_some_and(|&available| available >= line.quantity)
            })
        });

        let Some(merged) = merged else {
            state.reservations.insert(key.as_str().to_string(), false);
            return Ok(ReservationOutcome::Rejected {
                reason: REASON_NOT_ENOUGH_STOCK.to_string(),
            });
        };

        for line in &merged {
            if let Some(quantity) = state.stock.get_mut(&line.book_id) {
                *quantity -= line.quantity;
            }
        }
        state.reservations.insert(key.as_str().to_string(), true);

        Ok(ReservationOutcome::Reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(book_id: i64, quantity: i64) -> OrderLine {
        OrderLine::new(BookId::new(book_id), quantity)
    }

    #[tokio::test]
    async fn reserve_decrements_stock() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 5).await.unwrap();

        let outcome = store
            .reserve(&IdempotencyKey::new("k1"), &[line(42, 2)])
            .await
            .unwrap();

        assert_eq!(outcome, ReservationOutcome::Reserved);
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn insufficient_stock_rejects_without_mutation() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 1).await.unwrap();

        let outcome = store
            .reserve(&IdempotencyKey::new("k1"), &[line(42, 2)])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReservationOutcome::Rejected {
                reason: REASON_NOT_ENOUGH_STOCK.to_string()
            }
        );
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn one_short_line_rejects_the_whole_request() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(1), 10).await.unwrap();
        store.set_stock(BookId::new(2), 1).await.unwrap();

        let outcome = store
            .reserve(&IdempotencyKey::new("k1"), &[line(1, 3), line(2, 2)])
            .await
            .unwrap();

        assert!(matches!(outcome, ReservationOutcome::Rejected { .. }));
        // Nothing moved, not even the satisfiable line.
        assert_eq!(store.stock_level(BookId::new(1)).await.unwrap(), Some(10));
        assert_eq!(store.stock_level(BookId::new(2)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn duplicate_lines_are_checked_against_combined_demand() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 3).await.unwrap();

        let outcome = store
            .reserve(&IdempotencyKey::new("k1"), &[line(42, 2), line(42, 2)])
            .await
            .unwrap();
        assert!(matches!(outcome, ReservationOutcome::Rejected { .. }));
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(3));

        store.set_stock(BookId::new(42), 5).await.unwrap();
        let outcome = store
            .reserve(&IdempotencyKey::new("k2"), &[line(42, 2), line(42, 2)])
            .await
            .unwrap();
        assert_eq!(outcome, ReservationOutcome::Reserved);
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unknown_book_rejects() {
        let store = InMemoryInventoryStore::new();

        let outcome = store
            .reserve(&IdempotencyKey::new("k1"), &[line(99, 1)])
            .await
            .unwrap();

        assert!(matches!(outcome, ReservationOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn non_positive_quantity_rejects() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 5).await.unwrap();

        for quantity in [0, -1] {
            let outcome = store
                .reserve(
                    &IdempotencyKey::new(format!("k{quantity}")),
                    &[line(42, quantity)],
                )
                .await
                .unwrap();
            assert!(matches!(outcome, ReservationOutcome::Rejected { .. }));
        }
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn replayed_key_reports_recorded_outcome() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 5).await.unwrap();
        let key = IdempotencyKey::new("replay-me");

        let first = store.reserve(&key, &[line(42, 2)]).await.unwrap();
        assert_eq!(first, ReservationOutcome::Reserved);

        let second = store.reserve(&key, &[line(42, 2)]).await.unwrap();
        assert_eq!(
            second,
            ReservationOutcome::AlreadyProcessed { succeeded: true }
        );
        // Replay did not decrement again.
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn replayed_rejection_is_remembered() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 1).await.unwrap();
        let key = IdempotencyKey::new("rejected-once");

        let first = store.reserve(&key, &[line(42, 2)]).await.unwrap();
        assert!(matches!(first, ReservationOutcome::Rejected { .. }));

        // Stock grows later, but the recorded decision stands.
        store.set_stock(BookId::new(42), 10).await.unwrap();
        let second = store.reserve(&key, &[line(42, 2)]).await.unwrap();
        assert_eq!(
            second,
            ReservationOutcome::AlreadyProcessed { succeeded: false }
        );
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let store = InMemoryInventoryStore::new();
        store.set_stock(BookId::new(42), 3).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .reserve(&IdempotencyKey::new("a"), &[line(42, 2)])
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .reserve(&IdempotencyKey::new("b"), &[line(42, 2)])
                    .await
                    .unwrap()
            })
        };

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let successes = outcomes
            .iter()
            .filter(|o| **o == ReservationOutcome::Reserved)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.stock_level(BookId::new(42)).await.unwrap(), Some(1));
    }
}
