pub mod runtime;
pub mod types;

pub use runtime::{init_telemetry, shutdown_signal};
pub use types::{BookId, IdempotencyKey, OrderId, UserId};
