use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use common::{EventId, ProductId};

use crate::{
    CompletionEvent, CompletionOutcome, InventoryRecord, LedgerError, Result, StockLevel,
    store::InventoryLedger,
};

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<ProductId, InventoryRecord>,
    processed: HashMap<EventId, DateTime<Utc>>,
    fail_on_reserve: bool,
    unavailable: bool,
}

/// In-memory inventory ledger for tests and the default server wiring.
///
/// The single mutex stands in for the database's row lock: each operation
/// holds it for the whole read-check-write sequence, so the same invariants
/// hold as in the Postgres implementation.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures reserve calls to fail as if the store were unreachable.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.lock().await.fail_on_reserve = fail;
    }

    /// Configures every operation to fail as if the store were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Returns the number of recorded processed events.
    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.processed.len()
    }

    fn check_available(state: &LedgerState) -> Result<()> {
        if state.unavailable {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }

    fn record_mut<'a>(
        state: &'a mut LedgerState,
        product_id: &ProductId,
    ) -> Result<&'a mut InventoryRecord> {
        state
            .records
            .get_mut(product_id)
            .ok_or_else(|| LedgerError::NotFound(product_id.clone()))
    }

    /// Applies the confirm mutation; shared between `confirm_reservation`
    /// and `apply_completion`.
    fn confirm_in_place(
        state: &mut LedgerState,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<()> {
        let record = Self::record_mut(state, product_id)?;
        if record.stock_quantity - quantity < 0 || record.reserved_quantity - quantity < 0 {
            return Err(LedgerError::InvariantViolation(product_id.clone()));
        }
        record.stock_quantity -= quantity;
        record.reserved_quantity -= quantity;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<i64> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        Self::check_available(&state)?;
        if state.fail_on_reserve {
            return Err(LedgerError::Unavailable("reserve failed".to_string()));
        }

        let record = Self::record_mut(&mut state, product_id)?;
        let available = record.available();
        if available < quantity {
            return Err(LedgerError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested: quantity,
            });
        }

        record.reserved_quantity += quantity;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(available - quantity)
    }

    async fn confirm_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        Self::check_available(&state)?;
        Self::confirm_in_place(&mut state, product_id, quantity)
    }

    async fn release_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        Self::check_available(&state)?;

        let record = Self::record_mut(&mut state, product_id)?;
        if record.reserved_quantity - quantity < 0 {
            return Err(LedgerError::InvariantViolation(product_id.clone()));
        }
        record.reserved_quantity -= quantity;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn availability(&self, product_id: &ProductId) -> Result<StockLevel> {
        let state = self.state.lock().await;
        Self::check_available(&state)?;

        state
            .records
            .get(product_id)
            .map(InventoryRecord::stock_level)
            .ok_or_else(|| LedgerError::NotFound(product_id.clone()))
    }

    async fn set_stock(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity < 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        Self::check_available(&state)?;

        match state.records.get_mut(product_id) {
            Some(record) => {
                if quantity - record.reserved_quantity < 0 {
                    return Err(LedgerError::InvariantViolation(product_id.clone()));
                }
                record.stock_quantity = quantity;
                record.version += 1;
                record.updated_at = Utc::now();
            }
            None => {
                state.records.insert(
                    product_id.clone(),
                    InventoryRecord {
                        product_id: product_id.clone(),
                        stock_quantity: quantity,
                        reserved_quantity: 0,
                        version: 0,
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn apply_completion(&self, event: &CompletionEvent) -> Result<CompletionOutcome> {
        event.validate()?;

        let mut state = self.state.lock().await;
        Self::check_available(&state)?;

        if state.processed.contains_key(&event.event_id) {
            return Ok(CompletionOutcome { duplicate: true });
        }

        // A failed confirm leaves the event unrecorded, mirroring the
        // transaction rollback in the Postgres implementation.
        Self::confirm_in_place(&mut state, &event.product_id, event.quantity)?;
        state.processed.insert(event.event_id, Utc::now());
        Ok(CompletionOutcome { duplicate: false })
    }

    async fn prune_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        Self::check_available(&state)?;

        let before = state.processed.len();
        state.processed.retain(|_, observed_at| *observed_at >= cutoff);
        Ok((before - state.processed.len()) as u64)
    }
}
