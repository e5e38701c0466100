pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::Config;
pub use engine::ReservationEngine;
pub use error::{CatalogError, Result};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use store::{InventoryStore, ReservationOutcome};
