//! Inventory storage contract.

use async_trait::async_trait;
use common::{BookId, IdempotencyKey};
use messaging::OrderLine;

use crate::Result;

/// Decision recorded for one reservation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Every line was satisfied and stock was decremented.
    Reserved,
    /// The request was rejected as a whole; no stock changed.
    Rejected {
        /// Machine-readable reason code.
        reason: String,
    },
    /// The idempotency key was already processed; `succeeded` is the
    /// recorded decision. Stock is untouched on replay.
    AlreadyProcessed { succeeded: bool },
}

/// Storage backend for book stock levels and reservation decisions.
///
/// `reserve` is the only mutation the event flow performs and it must be
/// atomic: the stock check, the decrement of every line, and the recording
/// of the idempotency key commit together or not at all. Concurrent
/// reservations racing on the same book serialize inside the store, so
/// quantity never goes negative.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Sets the absolute stock level for a book, creating the record if
    /// needed.
    async fn set_stock(&self, book_id: BookId, quantity: i64) -> Result<()>;

    /// Returns the current stock level, or `None` when the book is unknown.
    async fn stock_level(&self, book_id: BookId) -> Result<Option<i64>>;

    /// Atomically decides and applies one reservation request.
    ///
    /// Lines are evaluated in request order. A non-positive quantity, a
    /// missing stock record, or insufficient stock on any line rejects the
    /// whole request without mutating anything. The decision is recorded
    /// under `key`, so a redelivered request replays the recorded outcome
    /// instead of touching stock again.
    async fn reserve(
        &self,
        key: &IdempotencyKey,
        lines: &[OrderLine],
    ) -> Result<ReservationOutcome>;
}

/// Merges duplicate book lines so the stock check sees the combined demand,
/// preserving first-appearance order. Returns `None` when any quantity is
/// non-positive, which rejects the whole request.
pub(crate) fn merge_lines(lines: &[OrderLine]) -> Option<Vec<OrderLine>> {
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return None;
        }
        match merged.iter_mut().find(|m| m.book_id == line.book_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(*line),
        }
    }
    Some(merged)
}
