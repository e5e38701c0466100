//! In-memory audit store for tests and single-process wiring.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::store::{AuditRecord, AuditStore, InsertOutcome};

#[derive(Default)]
struct State {
    records: Vec<AuditRecord>,
    seen: HashSet<(String, String)>,
}

/// In-memory audit store with the same uniqueness contract as PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all stored records, in insertion order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.state.read().await.records.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        let dedupe_key = (
            record.idempotency_key.as_str().to_string(),
            record.routing_key.clone(),
        );
        if !state.seen.insert(dedupe_key) {
            return Ok(InsertOutcome::Duplicate);
        }
        state.records.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.read().await.records.len() as i64)
    }
}
