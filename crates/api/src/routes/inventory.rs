//! Inventory reservation and event consumption endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use ledger::{CompletionEvent, InventoryLedger};
use saga::{NotificationPublisher, OrderStore, ProductCatalog};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::orders::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReserveResponse {
    pub available: i64,
}

#[derive(Serialize)]
pub struct EventAppliedResponse {
    pub duplicate: bool,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub product_id: String,
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub available_stock: i64,
}

// -- Handlers --

/// POST /inventory/reserve — place a hold on stock.
#[tracing::instrument(skip(state, req))]
pub async fn reserve<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Json(req): Json<ReservationRequest>,
) -> Result<Json<ReserveResponse>, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    let available = state.ledger.reserve(&req.product_id, req.quantity).await?;
    Ok(Json(ReserveResponse { available }))
}

/// POST /inventory/confirm-reservation — consume a held amount.
#[tracing::instrument(skip(state, req))]
pub async fn confirm<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Json(req): Json<ReservationRequest>,
) -> Result<StatusCode, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    state
        .ledger
        .confirm_reservation(&req.product_id, req.quantity)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /inventory/release-reservation — return a held amount to the pool.
#[tracing::instrument(skip(state, req))]
pub async fn release<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Json(req): Json<ReservationRequest>,
) -> Result<StatusCode, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    state
        .ledger
        .release_reservation(&req.product_id, req.quantity)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /inventory/events — apply a completion event exactly once.
///
/// Redelivered events report `duplicate: true` without touching inventory.
#[tracing::instrument(skip(state, event), fields(event_id = %event.event_id))]
pub async fn events<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Json(event): Json<CompletionEvent>,
) -> Result<Json<EventAppliedResponse>, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    let outcome = state.ledger.apply_completion(&event).await?;
    Ok(Json(EventAppliedResponse {
        duplicate: outcome.duplicate,
    }))
}

/// GET /inventory/:product_id — read current stock figures.
#[tracing::instrument(skip(state))]
pub async fn availability<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Path(product_id): Path<String>,
) -> Result<Json<AvailabilityResponse>, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    let product_id = ProductId::from(product_id);
    let level = state.ledger.availability(&product_id).await?;

    Ok(Json(AvailabilityResponse {
        product_id: product_id.to_string(),
        stock_quantity: level.stock_quantity,
        reserved_quantity: level.reserved_quantity,
        available_stock: level.available_stock,
    }))
}
