//! In-memory catalog.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::domain::catalog::{
    errors::CatalogError,
    models::{ProductId, ProductSummary},
    service::ProductCatalog,
};

/// Catalog backed by a map, for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<FxHashMap<ProductId, ProductSummary>>,
}

impl InMemoryCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog holding the given products.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = ProductSummary>) -> Self {
        let catalog = Self::new();

        for product in products {
            catalog.insert(product);
        }

        catalog
    }

    /// Add or replace a product.
    pub fn insert(&self, product: ProductSummary) {
        self.products
            .write()
            .insert(product.product_id.clone(), product);
    }

    /// Remove a product, returning whether it was present.
    pub fn remove(&self, product: &ProductId) -> bool {
        self.products.write().remove(product).is_some()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn resolve_summaries(
        &self,
        products: &[ProductId],
    ) -> Result<FxHashMap<ProductId, ProductSummary>, CatalogError> {
        let known = self.products.read();

        Ok(products
            .iter()
            .filter_map(|id| known.get(id).map(|summary| (id.clone(), summary.clone())))
            .collect())
    }
}
