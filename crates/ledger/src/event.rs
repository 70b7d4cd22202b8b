use serde::{Deserialize, Serialize};

use common::{EventId, OrderId, ProductId};

use crate::{LedgerError, Result};

/// Notification emitted after an order's reservation succeeds.
///
/// The delivery channel is at-least-once: the same event id may arrive any
/// number of times, and arrival order across different orders is undefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
}

impl CompletionEvent {
    /// Creates a new event with a fresh event id.
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            event_id: EventId::new(),
            order_id,
            product_id,
            quantity,
        }
    }

    /// Rejects malformed payloads before they reach the ledger.
    pub fn validate(&self) -> Result<()> {
        if self.product_id.is_empty() {
            return Err(LedgerError::Validation(
                "product_id must not be empty".to_string(),
            ));
        }
        if self.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(self.quantity));
        }
        Ok(())
    }
}

/// Result of applying a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    /// True when the event id had already been applied and inventory was
    /// left untouched.
    pub duplicate: bool,
}
