//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use ledger::InventoryLedger;
use saga::{NotificationPublisher, Order, OrderRequest, OrderSaga, OrderStore, ProductCatalog};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, L, C, P>
where
    S: OrderStore,
    L: InventoryLedger,
    C: ProductCatalog,
    P: NotificationPublisher,
{
    pub saga: OrderSaga<S, L, C, P>,
    pub ledger: L,
    pub catalog: C,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub requester_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub total_cents: i64,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            requester_id: order.requester_id.to_string(),
            product_id: order.product_id.to_string(),
            quantity: order.quantity,
            total_cents: order.total.cents(),
            status: order.status.to_string(),
            idempotency_key: order.idempotency_key,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PlaceOrderResponse {
    pub order: OrderResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_stock: Option<i64>,
    pub duplicate: bool,
}

// -- Handlers --

/// POST /orders — place an order through the saga.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Json(req): Json<OrderRequest>,
) -> Result<(axum::http::StatusCode, Json<PlaceOrderResponse>), ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    // The saga runs on its own task so a dropped client connection cannot
    // abandon a reservation halfway through.
    let task_state = state.clone();
    let placed = tokio::spawn(async move { task_state.saga.place_order(req).await })
        .await
        .map_err(|e| ApiError::Internal(format!("placement task failed: {e}")))??;

    let status = if placed.duplicate {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::CREATED
    };

    Ok((
        status,
        Json(PlaceOrderResponse {
            order: placed.order.into(),
            available_stock: placed.available_stock,
            duplicate: placed.duplicate,
        }),
    ))
}

/// GET /orders/:id — fetch a previously placed order.
#[tracing::instrument(skip(state))]
pub async fn get<S, L, C, P>(
    State(state): State<Arc<AppState<S, L, C, P>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + 'static,
    L: InventoryLedger + 'static,
    C: ProductCatalog + 'static,
    P: NotificationPublisher + 'static,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .saga
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order.into()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    Ok(OrderId::from(uuid))
}
