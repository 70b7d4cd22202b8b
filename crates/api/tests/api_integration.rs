//! Integration tests for the API server.
//!
//! Each test drives the full router over `tower::ServiceExt::oneshot`
//! against in-memory backends. The publisher is the recording in-memory
//! implementation, so nothing confirms reservations behind the tests' backs.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId};
use ledger::{InMemoryLedger, InventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryCatalog, InMemoryOrderStore, InMemoryPublisher, OrderSaga, Product};
use tower::ServiceExt;

use api::routes::orders::AppState;

type TestState = AppState<InMemoryOrderStore, InMemoryLedger, InMemoryCatalog, InMemoryPublisher>;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Router plus state over a catalog with SKU-001 at $25.00 and 10 in stock.
async fn setup() -> (Router, Arc<TestState>) {
    let store = InMemoryOrderStore::new();
    let ledger = InMemoryLedger::new();
    let catalog = InMemoryCatalog::new();
    let publisher = InMemoryPublisher::new();

    catalog.insert(Product::new("SKU-001", Money::from_cents(2500)));
    ledger
        .set_stock(&ProductId::from("SKU-001"), 10)
        .await
        .unwrap();

    let saga = OrderSaga::new(
        store.clone(),
        ledger.clone(),
        catalog.clone(),
        publisher.clone(),
    );
    let state = Arc::new(AppState {
        saga,
        ledger,
        catalog,
    });
    (api::create_app(state.clone(), get_metrics_handle()), state)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn order_body(quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "requester_id": uuid::Uuid::new_v4().to_string(),
        "product_id": "SKU-001",
        "quantity": quantity,
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let (status, json) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_place_order_created() {
    let (app, _) = setup().await;

    let (status, json) = send_json(&app, "POST", "/orders", order_body(3)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(!json["duplicate"].as_bool().unwrap());
    assert_eq!(json["available_stock"], 7);
    assert_eq!(json["order"]["quantity"], 3);
    assert_eq!(json["order"]["total_cents"], 7500);
    assert_eq!(json["order"]["status"], "pending");
    assert!(json["order"]["id"].as_str().is_some());
}

#[tokio::test]
async fn test_place_then_get_order() {
    let (app, _) = setup().await;

    let (_, created) = send_json(&app, "POST", "/orders", order_body(2)).await;
    let order_id = created["order"]["id"].as_str().unwrap();

    let (status, order) = get_json(&app, &format!("/orders/{order_id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], order_id);
    assert_eq!(order["quantity"], 2);
    assert_eq!(order["total_cents"], 5000);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let (app, _) = setup().await;
    let fake_id = uuid::Uuid::new_v4();

    let (status, json) = get_json(&app, &format!("/orders/{fake_id}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let (app, _) = setup().await;

    let (status, json) = get_json(&app, "/orders/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_zero_quantity_rejected_without_ledger_call() {
    let (app, state) = setup().await;

    let (status, json) = send_json(&app, "POST", "/orders", order_body(0)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // No hold was placed on stock.
    let level = state
        .ledger
        .availability(&ProductId::from("SKU-001"))
        .await
        .unwrap();
    assert_eq!(level.reserved_quantity, 0);
}

#[tokio::test]
async fn test_unknown_product_rejected() {
    let (app, _) = setup().await;

    let body = serde_json::json!({
        "requester_id": uuid::Uuid::new_v4().to_string(),
        "product_id": "SKU-404",
        "quantity": 1,
    });
    let (status, json) = send_json(&app, "POST", "/orders", body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "PRODUCT_NOT_FOUND");
}

#[tokio::test]
async fn test_insufficient_stock_reports_figures() {
    let (app, _) = setup().await;

    let (status, json) = send_json(&app, "POST", "/orders", order_body(20)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_STOCK");
    assert_eq!(json["available"], 10);
    assert_eq!(json["requested"], 20);
}

#[tokio::test]
async fn test_duplicate_submission_returns_existing_order() {
    let (app, _) = setup().await;

    let mut body = order_body(3);
    body["idempotency_key"] = serde_json::json!("retry-1");

    let (first_status, first) = send_json(&app, "POST", "/orders", body.clone()).await;
    let (second_status, second) = send_json(&app, "POST", "/orders", body).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert!(second["duplicate"].as_bool().unwrap());
    assert_eq!(second["order"]["id"], first["order"]["id"]);
    assert!(second["available_stock"].is_null());
}

#[tokio::test]
async fn test_catalog_outage_maps_to_service_unavailable() {
    let (app, state) = setup().await;
    state.catalog.set_unavailable(true);

    let (status, json) = send_json(&app, "POST", "/orders", order_body(1)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_reserve_endpoint() {
    let (app, _) = setup().await;

    let body = serde_json::json!({ "product_id": "SKU-001", "quantity": 4 });
    let (status, json) = send_json(&app, "POST", "/inventory/reserve", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], 6);
}

#[tokio::test]
async fn test_reserve_unknown_product() {
    let (app, _) = setup().await;

    let body = serde_json::json!({ "product_id": "SKU-404", "quantity": 1 });
    let (status, json) = send_json(&app, "POST", "/inventory/reserve", body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_reserve_insufficient_stock() {
    let (app, _) = setup().await;

    let body = serde_json::json!({ "product_id": "SKU-001", "quantity": 11 });
    let (status, json) = send_json(&app, "POST", "/inventory/reserve", body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_STOCK");
    assert_eq!(json["available"], 10);
    assert_eq!(json["requested"], 11);
}

#[tokio::test]
async fn test_confirm_and_release_endpoints() {
    let (app, _) = setup().await;

    let reserve = serde_json::json!({ "product_id": "SKU-001", "quantity": 5 });
    send_json(&app, "POST", "/inventory/reserve", reserve).await;

    let confirm = serde_json::json!({ "product_id": "SKU-001", "quantity": 3 });
    let (status, _) = send_json(&app, "POST", "/inventory/confirm-reservation", confirm).await;
    assert_eq!(status, StatusCode::OK);

    let release = serde_json::json!({ "product_id": "SKU-001", "quantity": 2 });
    let (status, _) = send_json(&app, "POST", "/inventory/release-reservation", release).await;
    assert_eq!(status, StatusCode::OK);

    // 10 stock - 3 confirmed = 7, nothing still held.
    let (status, json) = get_json(&app, "/inventory/SKU-001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stock_quantity"], 7);
    assert_eq!(json["reserved_quantity"], 0);
    assert_eq!(json["available_stock"], 7);
}

#[tokio::test]
async fn test_confirm_unknown_product() {
    let (app, _) = setup().await;

    let body = serde_json::json!({ "product_id": "SKU-404", "quantity": 1 });
    let (status, json) = send_json(&app, "POST", "/inventory/confirm-reservation", body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_event_endpoint_dedupes_redelivery() {
    let (app, _) = setup().await;

    let reserve = serde_json::json!({ "product_id": "SKU-001", "quantity": 2 });
    send_json(&app, "POST", "/inventory/reserve", reserve).await;

    let event = serde_json::json!({
        "event_id": uuid::Uuid::new_v4().to_string(),
        "order_id": uuid::Uuid::new_v4().to_string(),
        "product_id": "SKU-001",
        "quantity": 2,
    });

    let (status, json) = send_json(&app, "POST", "/inventory/events", event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["duplicate"].as_bool().unwrap());

    let (status, json) = send_json(&app, "POST", "/inventory/events", event).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["duplicate"].as_bool().unwrap());

    // Stock moved exactly once.
    let (_, level) = get_json(&app, "/inventory/SKU-001").await;
    assert_eq!(level["stock_quantity"], 8);
    assert_eq!(level["reserved_quantity"], 0);
}

#[tokio::test]
async fn test_event_endpoint_rejects_malformed_payload() {
    let (app, _) = setup().await;

    let event = serde_json::json!({
        "event_id": uuid::Uuid::new_v4().to_string(),
        "order_id": uuid::Uuid::new_v4().to_string(),
        "product_id": "SKU-001",
        "quantity": 0,
    });
    let (status, json) = send_json(&app, "POST", "/inventory/events", event).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_availability_unknown_product() {
    let (app, _) = setup().await;

    let (status, json) = get_json(&app, "/inventory/SKU-404").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
