//! Audit ingestion: every domain event becomes one audit row.

use async_trait::async_trait;
use messaging::{DecodedEvent, EventHandler, HandlerError};

use crate::store::{AuditRecord, AuditStore, InsertOutcome};

/// Consumes all domain routing keys and writes one audit row per envelope.
///
/// Deduplication lives in the store; a duplicate delivery is logged and
/// acknowledged. Store errors are retriable dispatch failures.
pub struct AuditIngestionWorker<S> {
    store: S,
}

impl<S: AuditStore> AuditIngestionWorker<S> {
    /// Creates a worker over the given audit store.
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: AuditStore> EventHandler for AuditIngestionWorker<S> {
    #[tracing::instrument(skip(self, event), fields(routing_key = %event.routing_key))]
    async fn handle(&self, event: &DecodedEvent) -> std::result::Result<(), HandlerError> {
        let record = AuditRecord {
            routing_key: event.routing_key.clone(),
            idempotency_key: event.envelope.idempotency_key.clone(),
            occurred_at: event.envelope.occurred_at,
            payload: event.envelope.payload.clone(),
        };

        let outcome = self
            .store
            .insert(&record)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        match outcome {
            InsertOutcome::Inserted => {
                metrics::counter!("audit_events_ingested_total").increment(1);
            }
            InsertOutcome::Duplicate => {
                metrics::counter!("audit_events_duplicate_total").increment(1);
                tracing::info!(
                    key = %record.idempotency_key,
                    "duplicate delivery, audit row already present"
                );
            }
        }

        Ok(())
    }
}
