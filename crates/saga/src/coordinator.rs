//! Order placement saga.
//!
//! Runs the placement steps in a fixed order: validate, idempotency check,
//! price lookup, stock reservation, then order insert and event publish as
//! one transactional unit. Each step that succeeds records its compensating
//! action; when a later step fails, recorded actions run in reverse.

use common::OrderId;
use ledger::{CompletionEvent, InventoryLedger};

use crate::catalog::ProductCatalog;
use crate::compensation::{CompensationAction, CompensationLog};
use crate::error::{Result, SagaError};
use crate::order::{Order, OrderRequest};
use crate::publisher::NotificationPublisher;
use crate::store::OrderStore;

/// Outcome of a handled order submission.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// Available stock right after the reservation. `None` for duplicate
    /// submissions, which reserve nothing.
    pub available_stock: Option<i64>,
    /// True when an earlier submission with the same idempotency key
    /// already placed this order.
    pub duplicate: bool,
}

/// Coordinates order placement across the store, ledger, catalog and
/// delivery channel.
pub struct OrderSaga<S, L, C, P>
where
    S: OrderStore,
    L: InventoryLedger,
    C: ProductCatalog,
    P: NotificationPublisher,
{
    store: S,
    ledger: L,
    catalog: C,
    publisher: P,
}

impl<S, L, C, P> OrderSaga<S, L, C, P>
where
    S: OrderStore,
    L: InventoryLedger,
    C: ProductCatalog,
    P: NotificationPublisher,
{
    /// Creates a new saga coordinator over the given collaborators.
    pub fn new(store: S, ledger: L, catalog: C, publisher: P) -> Self {
        Self {
            store,
            ledger,
            catalog,
            publisher,
        }
    }

    /// Places an order, driving the saga to completion or unwinding it.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn place_order(&self, request: OrderRequest) -> Result<PlacedOrder> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let result = self.run_placement(&request).await;
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());

        match &result {
            Ok(placed) if placed.duplicate => {
                metrics::counter!("saga_duplicates_total").increment(1);
            }
            Ok(placed) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(order_id = %placed.order.id, "order placed");
            }
            Err(e) => {
                metrics::counter!("saga_failed").increment(1);
                tracing::warn!(error = %e, "order placement failed");
            }
        }

        result
    }

    /// Fetches a previously placed order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.store.get(order_id).await
    }

    async fn run_placement(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        request.validate()?;

        // Resubmission with a known key short-circuits before any side
        // effect takes place.
        if let Some(key) = request.idempotency_key.as_deref()
            && let Some(existing) = self.store.find_by_idempotency_key(key).await?
        {
            tracing::info!(order_id = %existing.id, "duplicate submission");
            return Ok(PlacedOrder {
                order: existing,
                available_stock: None,
                duplicate: true,
            });
        }

        let product = self
            .catalog
            .lookup(&request.product_id)
            .await?
            .ok_or_else(|| SagaError::ProductNotFound(request.product_id.clone()))?;

        // First step with a side effect. A failed reserve leaves nothing
        // to unwind.
        let quantity = i64::from(request.quantity);
        let available = self.ledger.reserve(&request.product_id, quantity).await?;

        let mut compensations = CompensationLog::new();
        compensations.record(CompensationAction::ReleaseReservation {
            product_id: request.product_id.clone(),
            quantity,
        });

        let order = Order::from_request(request, product.unit_price);
        let event = CompletionEvent::new(order.id, order.product_id.clone(), quantity);

        match self
            .store
            .insert_published(&order, event, &self.publisher)
            .await
        {
            Ok(()) => Ok(PlacedOrder {
                order,
                available_stock: Some(available),
                duplicate: false,
            }),
            Err(e) => {
                self.compensate(&mut compensations).await;

                // A concurrent submission with the same key won the insert
                // race; surface the winner's order instead of an error.
                if let SagaError::DuplicateKey(ref key) = e
                    && let Some(existing) = self.store.find_by_idempotency_key(key).await?
                {
                    tracing::info!(order_id = %existing.id, "lost insert race to duplicate");
                    return Ok(PlacedOrder {
                        order: existing,
                        available_stock: None,
                        duplicate: true,
                    });
                }

                Err(e)
            }
        }
    }

    /// Runs recorded compensating actions newest-first. A failed action is
    /// logged for manual reconciliation and never retried inline.
    #[tracing::instrument(skip(self, log))]
    async fn compensate(&self, log: &mut CompensationLog) {
        for action in log.drain_reverse() {
            metrics::counter!("saga_compensations_total").increment(1);
            match action {
                CompensationAction::ReleaseReservation {
                    product_id,
                    quantity,
                } => {
                    if let Err(e) = self.ledger.release_reservation(&product_id, quantity).await {
                        metrics::counter!("saga_compensations_failed").increment(1);
                        tracing::error!(
                            %product_id,
                            quantity,
                            error = %e,
                            "compensation failed, manual reconciliation required"
                        );
                    }
                }
            }
        }
    }
}
