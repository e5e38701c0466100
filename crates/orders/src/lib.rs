pub mod config;
pub mod error;
pub mod memory;
pub mod outcome;
pub mod postgres;
pub mod pricing;
pub mod saga;
pub mod status;
pub mod store;

pub use config::Config;
pub use error::{OrdersError, Result};
pub use memory::InMemoryOrderStore;
pub use outcome::ReservationOutcomeHandler;
pub use postgres::PostgresOrderStore;
pub use pricing::{HttpPriceLookup, InMemoryPriceLookup, PriceLookup};
pub use saga::{NewOrderLine, OrderSagaInitiator};
pub use status::OrderStatus;
pub use store::{OrderLineRecord, OrderRecord, OrderStore};
