//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use ledger::PostgresLedger;
use saga::{ChannelPublisher, DeliveryWorker, InMemoryCatalog, OrderSaga, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;
use api::routes::orders::AppState;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let retention = chrono::Duration::hours(config.dedup_retention_hours);
    let prune_interval = Duration::from_secs(config.prune_interval_secs);

    // 3. Wire stores, saga, delivery worker, and pruner
    let app = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");

            let ledger = PostgresLedger::new(pool.clone());
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let store = PostgresOrderStore::new(pool);
            let catalog = InMemoryCatalog::new();
            api::seed_demo_catalog(&catalog);

            let (publisher, rx) = ChannelPublisher::new(256);
            tokio::spawn(DeliveryWorker::new(ledger.clone(), rx).run());
            api::spawn_dedup_pruner(ledger.clone(), prune_interval, retention);

            let saga = OrderSaga::new(store, ledger.clone(), catalog.clone(), publisher);
            let state = Arc::new(AppState {
                saga,
                ledger,
                catalog,
            });
            tracing::info!("using PostgreSQL backends");
            api::create_app(state, metrics_handle)
        }
        None => {
            let (state, _worker) = api::create_in_memory_state();
            api::seed_demo_catalog(&state.catalog);
            api::seed_demo_stock(&state.ledger)
                .await
                .expect("failed to seed demo stock");
            api::spawn_dedup_pruner(state.ledger.clone(), prune_interval, retention);

            tracing::info!("no DATABASE_URL set, using in-memory backends");
            api::create_app(state, metrics_handle)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
