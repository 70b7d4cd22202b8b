//! Saga implementation for order placement.
//!
//! This crate orchestrates a multi-step order placement against independent
//! collaborators, with compensating actions on failure.
//!
//! The placement saga follows these steps:
//! 1. Validate the submission
//! 2. Check the idempotency key for a previous placement
//! 3. Resolve the unit price from the product catalog
//! 4. Reserve stock in the inventory ledger
//! 5. Persist the order and publish its completion event as one unit
//!
//! If a step fails, compensating actions recorded by earlier steps run in
//! reverse order. A duplicate submission returns the original order without
//! reserving or publishing anything.

pub mod catalog;
pub mod compensation;
pub mod coordinator;
pub mod error;
pub mod order;
pub mod publisher;
pub mod store;

pub use catalog::{InMemoryCatalog, Product, ProductCatalog};
pub use compensation::{CompensationAction, CompensationLog};
pub use coordinator::{OrderSaga, PlacedOrder};
pub use error::{Result, SagaError};
pub use order::{MAX_QUANTITY, Order, OrderRequest, OrderStatus};
pub use publisher::{ChannelPublisher, DeliveryWorker, InMemoryPublisher, NotificationPublisher};
pub use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
