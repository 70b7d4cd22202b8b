use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::ProductId;

/// One row of the inventory ledger: the stock and reservation counts for a
/// single product.
///
/// Invariant: `stock_quantity - reserved_quantity >= 0` at all times. Every
/// mutation increments `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Stock not currently held by any reservation.
    pub fn available(&self) -> i64 {
        self.stock_quantity - self.reserved_quantity
    }

    /// The point-in-time availability figures for this record.
    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            stock_quantity: self.stock_quantity,
            reserved_quantity: self.reserved_quantity,
            available_stock: self.available(),
        }
    }
}

/// Read-only availability figures for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub available_stock: i64,
}
