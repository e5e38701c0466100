//! PostgreSQL-backed order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, OrderId, UserId};
use sqlx::{PgPool, Row};

use crate::Result;
use crate::status::OrderStatus;
use crate::store::{OrderLineRecord, OrderRecord, OrderStore};

/// PostgreSQL order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
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
impl OrderStore for PostgresOrderStore {
    async fn insert_order(
        &self,
        user_id: UserId,
        total_amount: f64,
        lines: &[OrderLineRecord],
    ) -> Result<OrderRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, status, total_amount)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(OrderStatus::Pending.as_str())
        .bind(total_amount)
        .fetch_one(&mut *tx)
        .await?;

        let id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, book_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id.as_i64())
            .bind(line.book_id.as_i64())
            .bind(line.quantity)
            .bind(line.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(OrderRecord {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            lines: lines.to_vec(),
            created_at,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let Some(row) = sqlx::query(
            "SELECT user_id, status, total_amount, created_at FROM orders WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown status {status_raw:?}").into()))?;

        let line_rows =
            sqlx::query("SELECT book_id, quantity, price FROM order_lines WHERE order_id = $1 ORDER BY id")
                .bind(id.as_i64())
                .fetch_all(&self.pool)
                .await?;

        let lines = line_rows
            .into_iter()
            .map(|row| {
                Ok(OrderLineRecord {
                    book_id: BookId::new(row.try_get("book_id")?),
                    quantity: row.try_get("quantity")?,
                    price: row.try_get("price")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(OrderRecord {
            id,
            user_id: UserId::new(row.try_get("user_id")?),
            status,
            total_amount: row.try_get("total_amount")?,
            lines,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn apply_outcome(&self, id: OrderId, status: OrderStatus) -> Result<bool> {
        // The status guard in the WHERE clause makes the transition
        // first-writer-wins under concurrent redelivery.
        let applied = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(id.as_i64())
            .bind(status.as_str())
            .bind(OrderStatus::Pending.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(applied > 0)
    }
}
