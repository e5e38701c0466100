//! Catalog service entry point.

use catalog::{Config, InMemoryInventoryStore, PostgresInventoryStore, ReservationEngine};
use messaging::{AmqpBroker, ConsumerRuntime, EventPublisher, EVENTS_TOPIC, routing};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    common::init_telemetry(config.metrics_port);

    let broker = AmqpBroker::connect(&config.amqp_uri)
        .await
        .expect("failed to connect to broker");
    let publisher = EventPublisher::bind(broker.clone(), EVENTS_TOPIC)
        .await
        .expect("failed to declare topic");

    let runtime = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresInventoryStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL inventory store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &[routing::STOCK_RESERVE_REQUEST],
                ReservationEngine::new(store, publisher),
            )
            .spawn()
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory inventory store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &[routing::STOCK_RESERVE_REQUEST],
                ReservationEngine::new(InMemoryInventoryStore::new(), publisher),
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

    tracing::info!("catalog service shut down gracefully");
}
