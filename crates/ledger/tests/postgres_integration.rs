//! PostgreSQL integration tests
//!
//! These tests share a single PostgreSQL container and truncate the ledger
//! tables between tests, so they are marked `#[serial]`. Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use ledger::{
    CompletionEvent, InventoryLedger, LedgerError, OrderId, PostgresLedger, ProductId,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_records.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_processed_events.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/003_create_orders.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool and cleared tables
async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE inventory_records, processed_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresLedger::new(pool)
}

async fn seed(ledger: &PostgresLedger, product: &str, stock: i64) -> ProductId {
    let product_id = ProductId::new(product);
    ledger.set_stock(&product_id, stock).await.unwrap();
    product_id
}

async fn version_of(ledger: &PostgresLedger, product_id: &ProductId) -> i64 {
    sqlx::query_scalar("SELECT version FROM inventory_records WHERE product_id = $1")
        .bind(product_id.as_str())
        .fetch_one(ledger.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn reserve_and_read_back_availability() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    let available = ledger.reserve(&product_id, 3).await.unwrap();
    assert_eq!(available, 7);

    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.stock_quantity, 10);
    assert_eq!(level.reserved_quantity, 3);
    assert_eq!(level.available_stock, 7);
}

#[tokio::test]
#[serial]
async fn concurrent_reserves_serialize_on_row_lock() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            let product_id = product_id.clone();
            tokio::spawn(async move { ledger.reserve(&product_id, 6).await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Exactly one attempt wins; the loser reads the winner's figures.
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(LedgerError::InsufficientStock {
            available: 4,
            requested: 6,
            ..
        })
    )));

    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.reserved_quantity, 6);
    assert_eq!(level.available_stock, 4);
}

#[tokio::test]
#[serial]
async fn check_constraint_rejects_negative_quantities() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    // Nothing reserved: confirm would drive reserved_quantity negative.
    let err = ledger
        .confirm_reservation(&product_id, 6)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));

    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.stock_quantity, 10);
    assert_eq!(level.reserved_quantity, 0);

    // The constraint also holds against writes that bypass the ledger.
    let direct = sqlx::query(
        "UPDATE inventory_records SET reserved_quantity = stock_quantity + 5 WHERE product_id = $1",
    )
    .bind(product_id.as_str())
    .execute(ledger.pool())
    .await;
    assert!(direct.is_err());
}

#[tokio::test]
#[serial]
async fn version_increments_on_every_mutation() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;
    assert_eq!(version_of(&ledger, &product_id).await, 0);

    ledger.reserve(&product_id, 2).await.unwrap();
    assert_eq!(version_of(&ledger, &product_id).await, 1);

    ledger.release_reservation(&product_id, 1).await.unwrap();
    assert_eq!(version_of(&ledger, &product_id).await, 2);

    ledger.confirm_reservation(&product_id, 1).await.unwrap();
    assert_eq!(version_of(&ledger, &product_id).await, 3);

    ledger.set_stock(&product_id, 20).await.unwrap();
    assert_eq!(version_of(&ledger, &product_id).await, 4);
}

#[tokio::test]
#[serial]
async fn release_restores_available() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    let available = ledger.reserve(&product_id, 3).await.unwrap();
    assert_eq!(available, 7);

    ledger.release_reservation(&product_id, 3).await.unwrap();
    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.available_stock, 10);
}

#[tokio::test]
#[serial]
async fn completion_event_applies_exactly_once() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;
    ledger.reserve(&product_id, 2).await.unwrap();

    let event = CompletionEvent::new(OrderId::new(), product_id.clone(), 2);

    let first = ledger.apply_completion(&event).await.unwrap();
    assert!(!first.duplicate);
    let second = ledger.apply_completion(&event).await.unwrap();
    assert!(second.duplicate);

    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.stock_quantity, 8);
    assert_eq!(level.reserved_quantity, 0);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(ledger.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
#[serial]
async fn failed_confirm_rolls_back_dedup_insert() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    // Nothing reserved: the confirm inside apply_completion fails, and the
    // dedup insert must roll back with it.
    let event = CompletionEvent::new(OrderId::new(), product_id.clone(), 2);
    let err = ledger.apply_completion(&event).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(ledger.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);

    // A later redelivery of the same event id still applies.
    ledger.reserve(&product_id, 2).await.unwrap();
    let outcome = ledger.apply_completion(&event).await.unwrap();
    assert!(!outcome.duplicate);
}

#[tokio::test]
#[serial]
async fn prune_removes_rows_older_than_cutoff() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;
    ledger.reserve(&product_id, 4).await.unwrap();

    let old_event = CompletionEvent::new(OrderId::new(), product_id.clone(), 2);
    let new_event = CompletionEvent::new(OrderId::new(), product_id.clone(), 2);
    ledger.apply_completion(&old_event).await.unwrap();
    ledger.apply_completion(&new_event).await.unwrap();

    // Age one row past the retention window.
    sqlx::query("UPDATE processed_events SET observed_at = NOW() - INTERVAL '100 hours' WHERE event_id = $1")
        .bind(old_event.event_id.as_uuid())
        .execute(ledger.pool())
        .await
        .unwrap();

    let removed = ledger
        .prune_processed_events(Utc::now() - Duration::hours(72))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(ledger.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
#[serial]
async fn missing_record_is_not_found() {
    let ledger = get_test_ledger().await;
    let product_id = ProductId::new("SKU-404");

    assert!(matches!(
        ledger.reserve(&product_id, 1).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        ledger.availability(&product_id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        ledger.confirm_reservation(&product_id, 1).await,
        Err(LedgerError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn set_stock_upserts_and_respects_reservations() {
    let ledger = get_test_ledger().await;
    let product_id = seed(&ledger, "SKU-001", 10).await;

    ledger.reserve(&product_id, 6).await.unwrap();
    ledger.set_stock(&product_id, 20).await.unwrap();

    let level = ledger.availability(&product_id).await.unwrap();
    assert_eq!(level.stock_quantity, 20);
    assert_eq!(level.reserved_quantity, 6);

    // Lowering stock below the reserved amount violates the CHECK.
    let err = ledger.set_stock(&product_id, 4).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));
}
