//! PostgreSQL-backed inventory store.

use async_trait::async_trait;
use common::{BookId, IdempotencyKey};
use messaging::{OrderLine, event::REASON_NOT_ENOUGH_STOCK};
use sqlx::PgPool;

use crate::Result;
use crate::store::{InventoryStore, ReservationOutcome, merge_lines};

/// PostgreSQL inventory store.
///
/// `reserve` runs inside one transaction: every requested stock row is
/// locked with `SELECT ... FOR UPDATE` before any decrement, so concurrent
/// requests racing on the same book serialize at the row lock and the
/// non-negativity invariant holds without application-level locking.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
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

    async fn recorded_outcome(&self, key: &IdempotencyKey) -> Result<bool> {
        let succeeded: bool =
            sqlx::query_scalar("SELECT succeeded FROM stock_reservations WHERE idempotency_key = $1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(succeeded)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn set_stock(&self, book_id: BookId, quantity: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock (book_id, quantity)
            VALUES ($1, $2)
            ON CONFLICT (book_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(book_id.as_i64())
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stock_level(&self, book_id: BookId) -> Result<Option<i64>> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM stock WHERE book_id = $1")
                .bind(book_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
        Ok(quantity)
    }

    async fn reserve(
        &self,
        key: &IdempotencyKey,
        lines: &[OrderLine],
    ) -> Result<ReservationOutcome> {
        let mut tx = self.pool.begin().await?;

        let recorded: Option<bool> =
            sqlx::query_scalar("SELECT succeeded FROM stock_reservations WHERE idempotency_key = $1")
                .bind(key.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(succeeded) = recorded {
            tx.rollback().await?;
            return Ok(ReservationOutcome::AlreadyProcessed { succeeded });
        }

        // Lock every requested row before mutating anything. Duplicate
        // lines are merged first so the check sees the combined demand;
        // the first unsatisfiable line rejects the whole request.
        let (merged, mut satisfiable) = match merge_lines(lines) {
            Some(merged) => (merged, true),
            None => (Vec::new(), false),
        };
        for line in &merged {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT quantity FROM stock WHERE book_id = $1 FOR UPDATE")
                    .bind(line.book_id.as_i64())
                    .fetch_optional(&mut *tx)
                    .await?;
            if !available.is_some_and(|a| a >= line.quantity) {
                satisfiable = false;
                break;
            }
        }

        if satisfiable {
            for line in &merged {
                sqlx::query("UPDATE stock SET quantity = quantity - $2 WHERE book_id = $1")
                    .bind(line.book_id.as_i64())
                    .bind(line.quantity)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_reservations (idempotency_key, succeeded)
            VALUES ($1, $2)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(satisfiable)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // A concurrent delivery of the same key won the race. Drop our
            // work and report theirs.
            tx.rollback().await?;
            let succeeded = self.recorded_outcome(key).await?;
            return Ok(ReservationOutcome::AlreadyProcessed { succeeded });
        }

        tx.commit().await?;

        if satisfiable {
            Ok(ReservationOutcome::Reserved)
        } else {
            Ok(ReservationOutcome::Rejected {
                reason: REASON_NOT_ENOUGH_STOCK.to_string(),
            })
        }
    }
}
