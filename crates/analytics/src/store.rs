//! Audit storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::IdempotencyKey;

use crate::Result;

/// One immutable audit row, mirroring a consumed envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub routing_key: String,
    pub idempotency_key: IdempotencyKey,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Result of an audit insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row for this `(idempotency_key, routing_key)` pair already exists;
    /// nothing was written.
    Duplicate,
}

/// Append-only storage for the audit trail.
///
/// Uniqueness over `(idempotency_key, routing_key)` is enforced by the
/// store, so at-least-once delivery yields exactly one row per event.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Inserts one record, reporting whether it was new.
    async fn insert(&self, record: &AuditRecord) -> Result<InsertOutcome>;

    /// Returns the number of stored records.
    async fn count(&self) -> Result<i64>;
}
