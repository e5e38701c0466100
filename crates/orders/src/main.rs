//! Orders service entry point: runs the reservation outcome consumer.
//!
//! Order creation itself is a library call (`OrderSagaInitiator`) made by
//! whatever front end owns the request path; this process closes the saga
//! loop by applying outcome events to persisted orders.

use messaging::{AmqpBroker, ConsumerRuntime, EVENTS_TOPIC, routing};
use orders::{Config, InMemoryOrderStore, PostgresOrderStore, ReservationOutcomeHandler};

const OUTCOME_KEYS: [&str; 2] = [
    routing::STOCK_RESERVE_SUCCEEDED,
    routing::STOCK_RESERVE_FAILED,
];

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    common::init_telemetry(config.metrics_port);

    let broker = AmqpBroker::connect(&config.amqp_uri)
        .await
        .expect("failed to connect to broker");

    let runtime = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresOrderStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL order store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &OUTCOME_KEYS,
                ReservationOutcomeHandler::new(store),
            )
            .spawn()
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &OUTCOME_KEYS,
                ReservationOutcomeHandler::new(InMemoryOrderStore::new()),
            )
            .spawn()
        }
    };

    common::shutdown_signal().await;
    broker.close().await.expect("failed to close broker");
    runtime
        .await
        .expect("consumer task panicked")
        .expect("consumer error");

    tracing::info!("orders service shut down gracefully");
}
