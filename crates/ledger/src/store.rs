use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::ProductId;

use crate::{CompletionEvent, CompletionOutcome, Result, StockLevel};

/// Core trait for inventory ledger implementations.
///
/// The ledger must never let `stock - reserved` go negative under concurrent
/// access. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Places a hold on `quantity` units of a product.
    ///
    /// Concurrent calls for the same product serialize on the record's lock;
    /// the loser observes the winner's updated figures. Fails with
    /// `InsufficientStock` when fewer than `quantity` units are available,
    /// leaving the record untouched.
    ///
    /// Returns the available count after the hold.
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<i64>;

    /// Moves a previously reserved amount into permanent consumption,
    /// decrementing both `stock` and `reserved` atomically.
    ///
    /// Sufficiency is not re-checked; a quantity exceeding the current
    /// reservation is rejected as an invariant violation.
    async fn confirm_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()>;

    /// Releases a hold without consuming stock, restoring availability.
    /// The compensating counterpart of `reserve`.
    async fn release_reservation(&self, product_id: &ProductId, quantity: i64) -> Result<()>;

    /// Read-only stock, reserved, and derived available counts.
    async fn availability(&self, product_id: &ProductId) -> Result<StockLevel>;

    /// Seeds or resets the absolute stock count for a product, creating the
    /// record if it does not exist. Reservations are left untouched.
    async fn set_stock(&self, product_id: &ProductId, quantity: i64) -> Result<()>;

    /// Applies a completion event exactly once.
    ///
    /// The first delivery of an event id confirms the reservation and
    /// durably records the id; every later delivery reports
    /// `duplicate: true` without touching inventory. Recording and
    /// confirmation succeed or fail together, so a failed confirm leaves the
    /// event unrecorded and safe to redeliver.
    async fn apply_completion(&self, event: &CompletionEvent) -> Result<CompletionOutcome>;

    /// Removes processed-event entries observed before `cutoff`.
    ///
    /// The cutoff must lag the delivery channel's maximum redelivery horizon
    /// by a comfortable margin. Returns the number of entries removed.
    async fn prune_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
