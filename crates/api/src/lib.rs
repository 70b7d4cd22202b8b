//! HTTP surface of the order placement system.
//!
//! Exposes the order saga and the inventory ledger over REST, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use chrono::Utc;
use ledger::{InMemoryLedger, InventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    ChannelPublisher, DeliveryWorker, InMemoryCatalog, InMemoryOrderStore, NotificationPublisher,
    OrderSaga, OrderStore, Product, ProductCatalog,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, L, C, P>(
    state: Arc<AppState<S, L, C, P>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S, L, C, P>))
        .route("/orders/{id}", get(routes::orders::get::<S, L, C, P>))
        .route(
            "/inventory/reserve",
            post(routes::inventory::reserve::<S, L, C, P>),
        )
        .route(
            "/inventory/confirm-reservation",
            post(routes::inventory::confirm::<S, L, C, P>),
        )
        .route(
            "/inventory/release-reservation",
            post(routes::inventory::release::<S, L, C, P>),
        )
        .route(
            "/inventory/events",
            post(routes::inventory::events::<S, L, C, P>),
        )
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::availability::<S, L, C, P>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Application state for the all-in-memory topology.
pub type InMemoryAppState =
    AppState<InMemoryOrderStore, InMemoryLedger, InMemoryCatalog, ChannelPublisher>;

/// Builds the in-memory topology: order store, ledger, catalog, the
/// channel-backed publisher, and the delivery worker that feeds published
/// completion events back into the ledger.
///
/// The returned handle resolves once the publishing side closes the channel.
pub fn create_in_memory_state() -> (Arc<InMemoryAppState>, tokio::task::JoinHandle<()>) {
    let store = InMemoryOrderStore::new();
    let ledger = InMemoryLedger::new();
    let catalog = InMemoryCatalog::new();

    let (publisher, rx) = ChannelPublisher::new(256);
    let worker = tokio::spawn(DeliveryWorker::new(ledger.clone(), rx).run());

    let saga = OrderSaga::new(store, ledger.clone(), catalog.clone(), publisher);
    let state = Arc::new(AppState {
        saga,
        ledger,
        catalog,
    });
    (state, worker)
}

const DEMO_PRODUCTS: [(&str, i64, i64); 3] = [
    ("SKU-001", 2500, 100),
    ("SKU-002", 990, 40),
    ("SKU-003", 14900, 5),
];

/// Fills the in-memory catalog stand-in with the demo products. The real
/// product lookup is an external collaborator.
pub fn seed_demo_catalog(catalog: &InMemoryCatalog) {
    for (sku, price_cents, _) in DEMO_PRODUCTS {
        catalog.insert(Product::new(sku, common::Money::from_cents(price_cents)));
    }
}

/// Seeds stock for the demo products, for runs without a database.
/// Durable inventory rows are otherwise created by an external step.
pub async fn seed_demo_stock(ledger: &impl InventoryLedger) -> ledger::Result<()> {
    for (sku, _, stock) in DEMO_PRODUCTS {
        ledger
            .set_stock(&common::ProductId::from(sku), stock)
            .await?;
    }
    Ok(())
}

/// Spawns the periodic dedup pruner: every `interval`, drop processed-event
/// entries older than `retention`.
pub fn spawn_dedup_pruner<L>(
    ledger: L,
    interval: Duration,
    retention: chrono::Duration,
) -> tokio::task::JoinHandle<()>
where
    L: InventoryLedger + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - retention;
            match ledger.prune_processed_events(cutoff).await {
                Ok(pruned) => {
                    if pruned > 0 {
                        tracing::info!(pruned, "pruned processed events");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dedup pruning failed"),
            }
        }
    })
}
