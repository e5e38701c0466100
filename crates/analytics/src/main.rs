//! Analytics service entry point.

use analytics::{AuditIngestionWorker, Config, InMemoryAuditStore, PostgresAuditStore};
use messaging::{AmqpBroker, ConsumerRuntime, EVENTS_TOPIC, routing};

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
            let store = PostgresAuditStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL audit store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &routing::ALL,
                AuditIngestionWorker::new(store),
            )
            .spawn()
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory audit store");
            ConsumerRuntime::new(
                broker.clone(),
                EVENTS_TOPIC,
                &routing::ALL,
                AuditIngestionWorker::new(InMemoryAuditStore::new()),
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

    tracing::info!("analytics service shut down gracefully");
}
