//! PostgreSQL-backed audit store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::Result;
use crate::store::{AuditRecord, AuditStore, InsertOutcome};

/// PostgreSQL audit store.
///
/// The `(idempotency_key, routing_key)` primary key plus
/// `ON CONFLICT DO NOTHING` makes duplicate deliveries detectable no-ops
/// without a read-before-write.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Creates a new PostgreSQL audit store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<InsertOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_events (idempotency_key, routing_key, occurred_at, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (idempotency_key, routing_key) DO NOTHING
            "#,
        )
        .bind(record.idempotency_key.as_str())
        .bind(&record.routing_key)
        .bind(record.occurred_at)
        .bind(&record.payload)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
