//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// A product as seen by the order flow: identity plus current unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub unit_price: Money,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, unit_price: Money) -> Self {
        Self {
            id: id.into(),
            unit_price,
        }
    }
}

/// Trait for product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolves a product by id. `Ok(None)` means the product does not
    /// exist; an error means the catalog could not be reached.
    async fn lookup(&self, product_id: &ProductId) -> Result<Option<Product>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Product>,
    unavailable: bool,
}

/// In-memory catalog for testing and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn insert(&self, product: Product) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product.id.clone(), product);
    }

    /// Configures lookups to fail as if the catalog were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Returns the number of known products.
    pub fn product_count(&self) -> usize {
        self.state.read().unwrap().products.len()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn lookup(&self, product_id: &ProductId) -> Result<Option<Product>, SagaError> {
        let state = self.state.read().unwrap();

        if state.unavailable {
            return Err(SagaError::ServiceUnavailable(
                "product catalog unreachable".to_string(),
            ));
        }

        Ok(state.products.get(product_id).cloned())
    }
}
