//! Shared types used across the order-placement and inventory crates.

pub mod types;

pub use types::{EventId, Money, OrderId, ProductId, RequesterId};
