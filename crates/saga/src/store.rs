//! Order persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, RequesterId};
use ledger::CompletionEvent;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::{Result, SagaError};
use crate::order::Order;
use crate::publisher::NotificationPublisher;

/// Trait for order storage.
///
/// Persisting an order and publishing its completion event form one unit
/// of work: [`OrderStore::insert_published`] makes the insert visible only
/// if the publish succeeds.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Looks up an order by its idempotency key.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>>;

    /// Fetches an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Persists the order and hands its completion event to the publisher.
    /// A failed publish aborts the insert.
    async fn insert_published<P: NotificationPublisher>(
        &self,
        order: &Order,
        event: CompletionEvent,
        publisher: &P,
    ) -> Result<()>;
}

/// PostgreSQL-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new store using the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|e| SagaError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let status = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e: String| SagaError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            requester_id: RequesterId::from_uuid(row.try_get("requester_id")?),
            product_id: ProductId::from(row.try_get::<String, _>("product_id")?),
            quantity,
            total: Money::from_cents(row.try_get("total_cents")?),
            status,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, requester_id, product_id, quantity, total_cents,
                   status, idempotency_key, created_at
            FROM orders
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, requester_id, product_id, quantity, total_cents,
                   status, idempotency_key, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn insert_published<P: NotificationPublisher>(
        &self,
        order: &Order,
        event: CompletionEvent,
        publisher: &P,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, requester_id, product_id, quantity, total_cents,
                                status, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.requester_id.as_uuid())
        .bind(order.product_id.as_str())
        .bind(i64::from(order.quantity))
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.idempotency_key.as_deref())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("idx_orders_idempotency_key")
            {
                return SagaError::DuplicateKey(
                    order.idempotency_key.clone().unwrap_or_default(),
                );
            }
            SagaError::Database(e)
        })?;

        // Publish before commit so a rejected event rolls the insert back.
        publisher.publish(event).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryOrderStoreState {
    orders: HashMap<OrderId, Order>,
}

/// In-memory order store for testing and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderStoreState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        let state = self.state.read().unwrap();
        Ok(state
            .orders
            .values()
            .find(|o| o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().unwrap().orders.get(&order_id).cloned())
    }

    async fn insert_published<P: NotificationPublisher>(
        &self,
        order: &Order,
        event: CompletionEvent,
        publisher: &P,
    ) -> Result<()> {
        // The guard must not be held across the publish await point.
        {
            let state = self.state.read().unwrap();
            if let Some(key) = order.idempotency_key.as_deref()
                && state
                    .orders
                    .values()
                    .any(|o| o.idempotency_key.as_deref() == Some(key))
            {
                return Err(SagaError::DuplicateKey(key.to_string()));
            }
        }

        publisher.publish(event).await?;

        self.state
            .write()
            .unwrap()
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }
}
