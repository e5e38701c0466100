//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its fulfillment lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Reserved
///           └──► ReservationFailed
/// ```
///
/// Both outcome states are terminal. Transitions are driven by the
/// reservation outcome events; applying an outcome to a non-pending order is
/// a no-op, which keeps redelivered outcomes harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order persisted, reservation outcome not yet known.
    #[default]
    Pending,

    /// Stock was reserved for every line (terminal state).
    Reserved,

    /// The reservation was rejected (terminal state).
    ReservationFailed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::ReservationFailed)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Reserved => "reserved",
            OrderStatus::ReservationFailed => "reservation_failed",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "reserved" => Some(OrderStatus::Reserved),
            "reservation_failed" => Some(OrderStatus::ReservationFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
