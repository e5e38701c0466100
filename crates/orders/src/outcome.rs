//! Consumer closing the saga loop on reservation outcomes.

use async_trait::async_trait;
use messaging::{DecodedEvent, DomainEvent, EventHandler, HandlerError};

use crate::status::OrderStatus;
use crate::store::OrderStore;

/// Consumes `stock.reserve.succeeded` / `stock.reserve.failed` and moves the
/// order into the matching terminal status.
///
/// Transitions apply at most once; a redelivered or contradictory outcome for
/// an order that already left `pending` is a logged no-op.
pub struct ReservationOutcomeHandler<S> {
    store: S,
}

impl<S: OrderStore> ReservationOutcomeHandler<S> {
    /// Creates a handler over the given order store.
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for ReservationOutcomeHandler<S> {
    #[tracing::instrument(skip(self, event), fields(key = %event.envelope.idempotency_key))]
    async fn handle(&self, event: &DecodedEvent) -> std::result::Result<(), HandlerError> {
        let (order_id, status) = match &event.event {
            DomainEvent::StockReserveSucceeded(p) => {
                (p.original.order_id, OrderStatus::Reserved)
            }
            DomainEvent::StockReserveFailed(p) => {
                (p.original.order_id, OrderStatus::ReservationFailed)
            }
            _ => return Ok(()),
        };

        let applied = self
            .store
            .apply_outcome(order_id, status)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        if applied {
            metrics::counter!("order_outcomes_applied_total").increment(1);
            tracing::info!(%order_id, %status, "order status updated");
        } else {
            tracing::info!(%order_id, %status, "outcome ignored, order not pending");
        }

        Ok(())
    }
}
