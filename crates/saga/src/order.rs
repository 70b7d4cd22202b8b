//! Order model and submission request.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, RequesterId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// Maximum quantity accepted for a single order.
pub const MAX_QUANTITY: u32 = 10_000;

/// Maximum accepted length of an idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Status of a persisted order.
///
/// `Pending` is the only status the placement flow ever records; fulfillment
/// progress is tracked by the inventory ledger, not by order state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A placed order as persisted by the order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub requester_id: RequesterId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Total price: unit price at placement time multiplied by quantity.
    pub total: Money,
    pub status: OrderStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new pending order from a validated request and the unit
    /// price resolved from the catalog.
    pub fn from_request(request: &OrderRequest, unit_price: Money) -> Self {
        Self {
            id: OrderId::new(),
            requester_id: request.requester_id,
            product_id: request.product_id.clone(),
            quantity: request.quantity,
            total: unit_price.multiply(request.quantity),
            status: OrderStatus::Pending,
            idempotency_key: request.idempotency_key.clone(),
            created_at: Utc::now(),
        }
    }
}

/// An order submission as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub requester_id: RequesterId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Optional client-chosen key that makes resubmission safe.
    pub idempotency_key: Option<String>,
}

impl OrderRequest {
    /// Checks field-level constraints. Runs before any side effect.
    pub fn validate(&self) -> Result<()> {
        if self.product_id.is_empty() {
            return Err(SagaError::Validation(
                "product_id must not be empty".to_string(),
            ));
        }
        if self.quantity == 0 {
            return Err(SagaError::Validation(
                "quantity must be positive".to_string(),
            ));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(SagaError::Validation(format!(
                "quantity must not exceed {MAX_QUANTITY}"
            )));
        }
        if let Some(key) = self.idempotency_key.as_deref() {
            if key.is_empty() {
                return Err(SagaError::Validation(
                    "idempotency_key must not be empty when supplied".to_string(),
                ));
            }
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(SagaError::Validation(format!(
                    "idempotency_key must not exceed {MAX_IDEMPOTENCY_KEY_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}
