//! Catalog lookup port.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;

use crate::domain::catalog::{
    errors::CatalogError,
    models::{ProductId, ProductSummary},
};

/// Read-only product lookups.
#[automock]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolve summaries for the given ids in one round trip.
    ///
    /// Ids the catalog does not know are absent from the returned map.
    async fn resolve_summaries(
        &self,
        products: &[ProductId],
    ) -> Result<FxHashMap<ProductId, ProductSummary>, CatalogError>;
}
