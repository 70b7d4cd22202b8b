//! Saga error types.

use common::{OrderId, ProductId};
use ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur during order placement.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request failed validation and was rejected before any side
    /// effects took place.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A collaborating service could not be reached. Retryable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The completion event could not be handed to the delivery channel.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Another submission carrying the same idempotency key won the
    /// insert race.
    #[error("Duplicate idempotency key: {0}")]
    DuplicateKey(String),

    /// Inventory ledger error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Database error from the order store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
