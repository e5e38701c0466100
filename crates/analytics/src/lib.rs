pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{AnalyticsError, Result};
pub use memory::InMemoryAuditStore;
pub use postgres::PostgresAuditStore;
pub use store::{AuditRecord, AuditStore, InsertOutcome};
pub use worker::AuditIngestionWorker;
