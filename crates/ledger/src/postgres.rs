use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use common::ProductId;

use crate::{
    CompletionEvent, CompletionOutcome, InventoryRecord, LedgerError, Result, StockLevel,
    store::InventoryLedger,
};

/// PostgreSQL-backed inventory ledger.
///
/// Every mutation runs in its own transaction and reads the record under
/// `SELECT ... FOR UPDATE`, so concurrent writers for the same product
/// serialize at the database. The write itself is additionally guarded by
/// the version read under the lock, and the table's CHECK constraints reject
/// any write that would drive a quantity negative.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Reads the record under the row lock, serializing writers per product.
    async fn lock_record(
        tx: &mut Transaction<'_, Postgres>,
        product_id: &ProductId,
    ) -> Result<InventoryRecord> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT product_id, stock_quantity, reserved_quantity, version, updated_at
            FROM inventory_records
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(LedgerError::NotFound(product_id.clone())),
        }
    }

    /// Writes new quantities guarded by the version read under the lock.
    /// Zero matched rows means another writer committed in between, which
    /// the row lock should have prevented; surfaced as a retryable conflict.
    async fn write_quantities(
        tx: &mut Transaction<'_, Postgres>,
        product_id: &ProductId,
        stock: i64,
        reserved: i64,
        expected_version: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET stock_quantity = $1,
                reserved_quantity = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE product_id = $3 AND version = $4
            "#,
        )
        .bind(stock)
        .bind(reserved)
        .bind(product_id.as_str())
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(|e| Self::map_quantity_violation(e, product_id))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Conflict(product_id.clone()));
        }
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<InventoryRecord> {
        Ok(InventoryRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            stock_quantity: row.try_get("stock_quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_quantity_violation(e: sqlx::Error, product_id: &ProductId) -> LedgerError {
        if let sqlx::Error::Database(ref db_err) = e
            && matches!(db_err.kind(), sqlx::error::ErrorKind::CheckViolation)
        {
            return LedgerError::InvariantViolation(product_id.clone());
        }
        LedgerError::Database(e)
    }
}

#[async_trait]
impl InventoryLedger for PostgresLedger {
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<i64> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, product_id).await?;

        let available = record.available();
        if available < quantity {
            return Err(LedgerError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested: quantity,
            });
        }

        Self::write_quantities(
            &mut tx,
            product_id,
            record.stock_quantity,
            record.reserved_quantity + quantity,
            record.version,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(quantity, available = available - quantity, "reserved stock");
        Ok(available - quantity)
    }

    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    async fn confirm_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, product_id).await?;

        Self::write_quantities(
            &mut tx,
            product_id,
            record.stock_quantity - quantity,
            record.reserved_quantity - quantity,
            record.version,
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    async fn release_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, product_id).await?;

        Self::write_quantities(
            &mut tx,
            product_id,
            record.stock_quantity,
            record.reserved_quantity - quantity,
            record.version,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(quantity, "released reservation");
        Ok(())
    }

    async fn availability(&self, product_id: &ProductId) -> Result<StockLevel> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT product_id, stock_quantity, reserved_quantity, version, updated_at
            FROM inventory_records
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Self::row_to_record(row)?.stock_level()),
            None => Err(LedgerError::NotFound(product_id.clone())),
        }
    }

    async fn set_stock(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity < 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        sqlx::query(
            r#"
            INSERT INTO inventory_records (product_id, stock_quantity)
            VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET
                stock_quantity = EXCLUDED.stock_quantity,
                version = inventory_records.version + 1,
                updated_at = NOW()
            "#,
        )
        .bind(product_id.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_quantity_violation(e, product_id))?;

        Ok(())
    }

    #[tracing::instrument(
        skip(self, event),
        fields(event_id = %event.event_id, order_id = %event.order_id)
    )]
    async fn apply_completion(&self, event: &CompletionEvent) -> Result<CompletionOutcome> {
        event.validate()?;

        let mut tx = self.pool.begin().await?;

        // Insert-if-absent is the idempotency gate: zero rows affected means
        // this event id was already applied.
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, order_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.order_id.as_uuid())
        .bind(event.product_id.as_str())
        .bind(event.quantity)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::info!("duplicate delivery ignored");
            return Ok(CompletionOutcome { duplicate: true });
        }

        // The dedup row and the stock movement commit or roll back together,
        // so a failed confirm leaves the event safe to redeliver.
        let record = Self::lock_record(&mut tx, &event.product_id).await?;
        Self::write_quantities(
            &mut tx,
            &event.product_id,
            record.stock_quantity - event.quantity,
            record.reserved_quantity - event.quantity,
            record.version,
        )
        .await?;
        tx.commit().await?;

        Ok(CompletionOutcome { duplicate: false })
    }

    async fn prune_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processed_events WHERE observed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            tracing::debug!(pruned, %cutoff, "pruned processed events");
        }
        Ok(pruned)
    }
}
