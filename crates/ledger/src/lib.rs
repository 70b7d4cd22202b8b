//! Inventory reservation ledger.
//!
//! The ledger is the sole authority over stock and reservation counts. It
//! exposes the reserve/confirm/release protocol used by the order saga, plus
//! the idempotent entry point that applies at-least-once-delivered completion
//! events exactly once.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{EventId, OrderId, ProductId};
pub use error::{LedgerError, Result};
pub use event::{CompletionEvent, CompletionOutcome};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use record::{InventoryRecord, StockLevel};
pub use store::InventoryLedger;
