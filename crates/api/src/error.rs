//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger::LedgerError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body carries a machine-readable `code` alongside the
/// human-readable `message`, so clients never have to parse prose.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement error.
    Saga(SagaError),
    /// Inventory ledger error.
    Ledger(LedgerError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "code": "NOT_FOUND", "message": msg }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "code": "VALIDATION_ERROR", "message": msg }),
            ),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "code": "INTERNAL", "message": msg }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, serde_json::Value) {
    match err {
        SagaError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "code": "VALIDATION_ERROR", "message": err.to_string() }),
        ),
        SagaError::ProductNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "code": "PRODUCT_NOT_FOUND", "message": err.to_string() }),
        ),
        SagaError::OrderNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "code": "NOT_FOUND", "message": err.to_string() }),
        ),
        SagaError::ServiceUnavailable(_) | SagaError::Publish(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "code": "SERVICE_UNAVAILABLE", "message": err.to_string() }),
        ),
        // The coordinator resolves duplicate-key races itself; one escaping
        // here means the winning row vanished between insert and re-fetch.
        SagaError::DuplicateKey(_) => (
            StatusCode::CONFLICT,
            serde_json::json!({ "code": "CONCURRENT_MODIFICATION", "message": err.to_string() }),
        ),
        SagaError::Ledger(inner) => ledger_error_to_response(inner),
        SagaError::Database(ref db_err) => database_error_to_response(&err, db_err),
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, serde_json::Value) {
    match &err {
        LedgerError::InsufficientStock {
            available,
            requested,
            ..
        } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "code": "INSUFFICIENT_STOCK",
                "message": err.to_string(),
                "available": available,
                "requested": requested,
            }),
        ),
        LedgerError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "code": "NOT_FOUND", "message": err.to_string() }),
        ),
        LedgerError::Conflict(_) => (
            StatusCode::CONFLICT,
            serde_json::json!({ "code": "CONCURRENT_MODIFICATION", "message": err.to_string() }),
        ),
        LedgerError::InvalidQuantity(_) | LedgerError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "code": "VALIDATION_ERROR", "message": err.to_string() }),
        ),
        LedgerError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "code": "SERVICE_UNAVAILABLE", "message": err.to_string() }),
        ),
        LedgerError::Database(db_err) => database_error_to_response(&err, db_err),
        LedgerError::InvariantViolation(_) | LedgerError::Migration(_) => {
            tracing::error!(error = %err, "inventory ledger internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "code": "INTERNAL", "message": err.to_string() }),
            )
        }
    }
}

/// Connection-level failures are transient and worth a client retry;
/// everything else from the database is a server fault.
fn database_error_to_response(
    err: &dyn std::fmt::Display,
    db_err: &sqlx::Error,
) -> (StatusCode, serde_json::Value) {
    match db_err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "code": "SERVICE_UNAVAILABLE", "message": err.to_string() }),
        ),
        _ => {
            tracing::error!(error = %err, "database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "code": "INTERNAL", "message": err.to_string() }),
            )
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
