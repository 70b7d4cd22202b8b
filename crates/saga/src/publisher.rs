//! Completion event publishing and the delivery worker.
//!
//! Publication is synchronous from the saga's point of view: a failed
//! publish aborts the order transaction. Delivery to the inventory ledger
//! is at-least-once and owned by the channel, so the ledger side dedupes
//! by event id.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ledger::{CompletionEvent, InventoryLedger, LedgerError};
use tokio::sync::mpsc;

use crate::error::SagaError;

/// How long a publish may wait for channel capacity before it is treated
/// as a delivery failure.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Trait for handing completion events to the delivery channel.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Enqueues one event for delivery. An error means the event was not
    /// accepted and the caller must treat the publish as failed.
    async fn publish(&self, event: CompletionEvent) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<CompletionEvent>,
    fail_on_publish: bool,
}

/// In-memory publisher for testing; records accepted events.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject the next publish calls.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns the number of accepted events.
    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }

    /// Returns a copy of all accepted events in publish order.
    pub fn published(&self) -> Vec<CompletionEvent> {
        self.state.read().unwrap().published.clone()
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryPublisher {
    async fn publish(&self, event: CompletionEvent) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_publish {
            return Err(SagaError::Publish(
                "delivery channel rejected the event".to_string(),
            ));
        }

        state.published.push(event);
        Ok(())
    }
}

/// Publisher backed by an in-process channel, feeding a [`DeliveryWorker`].
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<CompletionEvent>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiving end for a delivery worker.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CompletionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPublisher for ChannelPublisher {
    async fn publish(&self, event: CompletionEvent) -> Result<(), SagaError> {
        self.tx
            .send_timeout(event, PUBLISH_TIMEOUT)
            .await
            .map_err(|e| SagaError::Publish(format!("delivery channel unavailable: {e}")))
    }
}

/// Consumes published events and applies them to the inventory ledger.
///
/// Delivery is at-least-once: transient ledger failures are redelivered up
/// to `max_attempts` times, then the event is dropped with an error log.
/// Permanently rejected events (validation failures, invariant violations)
/// are never retried.
pub struct DeliveryWorker<L: InventoryLedger> {
    ledger: L,
    rx: mpsc::Receiver<CompletionEvent>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<L: InventoryLedger> DeliveryWorker<L> {
    /// Creates a worker reading from `rx` and applying events to `ledger`.
    pub fn new(ledger: L, rx: mpsc::Receiver<CompletionEvent>) -> Self {
        Self {
            ledger,
            rx,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the redelivery policy.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Runs until the publishing side closes the channel.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.deliver(event).await;
        }
        tracing::info!("delivery channel closed, worker stopping");
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, order_id = %event.order_id))]
    async fn deliver(&self, event: CompletionEvent) {
        for attempt in 1..=self.max_attempts {
            match self.ledger.apply_completion(&event).await {
                Ok(outcome) => {
                    if outcome.duplicate {
                        metrics::counter!("delivery_events_duplicate").increment(1);
                    } else {
                        metrics::counter!("delivery_events_applied").increment(1);
                    }
                    return;
                }
                Err(
                    e @ (LedgerError::Validation(_)
                    | LedgerError::InvalidQuantity(_)
                    | LedgerError::InvariantViolation(_)),
                ) => {
                    metrics::counter!("delivery_events_rejected").increment(1);
                    tracing::error!(error = %e, "event rejected permanently");
                    return;
                }
                Err(e) => {
                    metrics::counter!("delivery_retries_total").increment(1);
                    tracing::warn!(error = %e, attempt, "delivery failed, will retry");
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        metrics::counter!("delivery_events_dropped").increment(1);
        tracing::error!(
            max_attempts = self.max_attempts,
            "event dropped after repeated delivery failures"
        );
    }
}
