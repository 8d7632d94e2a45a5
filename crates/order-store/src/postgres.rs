use async_trait::async_trait;
use common::{CustomerId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{OrderRecord, OrderStore, Result, StoreError};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` and returns a store.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<OrderRecord> {
        Ok(OrderRecord {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            status: row.try_get("status")?,
            document: row.try_get("document")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, record: &OrderRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_states (order_id, customer_id, status, document, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(record.order_id.as_str())
        .bind(record.customer_id.as_str())
        .bind(&record.status)
        .bind(&record.document)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(record.order_id.clone()));
        }
        Ok(())
    }

    async fn save(&self, record: &OrderRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_states
            SET status = $2, document = $3, updated_at = $4
            WHERE order_id = $1
            "#,
        )
        .bind(record.order_id.as_str())
        .bind(&record.status)
        .bind(&record.document)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.order_id.clone()));
        }
        Ok(())
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, customer_id, status, document, updated_at
            FROM order_states
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, customer_id, status, document, updated_at
            FROM order_states
            WHERE customer_id = $1
            ORDER BY updated_at ASC, order_id ASC
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}
