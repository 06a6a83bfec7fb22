//! Cart Items Repository

use std::{num::ParseIntError, time::Duration};

use crate::{
    domain::{
        carts::{errors::CartsServiceError, keys::CartKeys},
        catalog::models::ProductId,
    },
    ids::CartId,
    store::{KeyValueStore, StoreError},
};

/// Item index and quantity hash access for one cart.
#[derive(Debug, Clone)]
pub(crate) struct KvCartItemsRepository {
    keys: CartKeys,
}

impl KvCartItemsRepository {
    #[must_use]
    pub(crate) fn new(keys: CartKeys) -> Self {
        Self { keys }
    }

    /// Carted product ids in insertion order.
    pub(crate) async fn product_ids(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
    ) -> Result<Vec<ProductId>, CartsServiceError> {
        let key = self.keys.item_index(cart);

        store
            .list_range(&key)
            .await?
            .into_iter()
            .map(|raw| {
                ProductId::new(raw).ok_or_else(|| CartsServiceError::CorruptSession {
                    key: key.clone(),
                })
            })
            .collect()
    }

    pub(crate) async fn has_items(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
    ) -> Result<bool, StoreError> {
        store.exists(&self.keys.item_index(cart)).await
    }

    /// Stored quantity, `None` when the product is not carted.
    pub(crate) async fn quantity(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<Option<u32>, CartsServiceError> {
        let key = self.keys.quantities(cart);

        store
            .hash_get(&key, product.as_str())
            .await?
            .map(|raw| parse_quantity(&raw))
            .transpose()
            .map_err(|_invalid| CartsServiceError::CorruptSession { key })
    }

    /// Quantities for `products` in one round trip, 0 for missing entries.
    pub(crate) async fn quantities(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        products: &[ProductId],
    ) -> Result<Vec<u32>, CartsServiceError> {
        let key = self.keys.quantities(cart);
        let fields: Vec<String> = products.iter().map(String::from).collect();

        store
            .hash_multi_get(&key, &fields)
            .await?
            .into_iter()
            .map(|raw| raw.as_deref().map_or(Ok(0), parse_quantity))
            .collect::<Result<_, _>>()
            .map_err(|_invalid| CartsServiceError::CorruptSession { key })
    }

    /// Record quantity 1 for a product and append it to the index. Both keys
    /// get `ttl` as soon as they are written, and the index never holds the
    /// product twice.
    pub(crate) async fn insert(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        product: &ProductId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let quantities = self.keys.quantities(cart);
        let index = self.keys.item_index(cart);

        store.hash_set(&quantities, product.as_str(), "1").await?;
        store.expire(&quantities, ttl).await?;

        store.list_remove(&index, product.as_str()).await?;
        store.list_push(&index, product.as_str()).await?;
        store.expire(&index, ttl).await?;

        Ok(())
    }

    /// Add `delta` to a carted quantity, returning the new value.
    pub(crate) async fn increment(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        product: &ProductId,
        delta: i64,
    ) -> Result<u32, CartsServiceError> {
        let key = self.keys.quantities(cart);

        let next = store.hash_increment(&key, product.as_str(), delta).await?;

        u32::try_from(next).map_err(|_out_of_range| CartsServiceError::CorruptSession { key })
    }

    /// Drop a product from both the quantities and the index.
    pub(crate) async fn remove(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<(), StoreError> {
        store
            .hash_delete(&self.keys.quantities(cart), product.as_str())
            .await?;

        store
            .list_remove(&self.keys.item_index(cart), product.as_str())
            .await?;

        Ok(())
    }
}

fn parse_quantity(raw: &str) -> Result<u32, ParseIntError> {
    raw.parse()
}
