use thiserror::Error;

use common::ProductId;

/// Errors that can occur when interacting with the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Not enough unreserved stock to satisfy the requested quantity.
    /// An expected business outcome, not a fault.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// No inventory record exists for the product.
    #[error("Inventory record not found: {0}")]
    NotFound(ProductId),

    /// Another writer committed between the locked read and the guarded
    /// write. Retryable with fresh state.
    #[error("Concurrent modification of inventory record {0}")]
    Conflict(ProductId),

    /// A write would have driven a quantity column negative and was rejected
    /// by a database CHECK constraint.
    #[error("Invariant violation on inventory record {0}: quantity constraint rejected the write")]
    InvariantViolation(ProductId),

    /// The requested quantity is not positive.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backing store could not be reached. Retryable.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
