//! Session Repository

use std::time::Duration;

use crate::{
    domain::carts::{errors::CartsServiceError, fsm::CartState, keys::CartKeys},
    ids::CartId,
    store::{KeyValueStore, StoreError},
};

/// State key reads and writes plus whole-session expiry and destruction.
#[derive(Debug, Clone)]
pub(crate) struct KvSessionRepository {
    keys: CartKeys,
}

impl KvSessionRepository {
    #[must_use]
    pub(crate) fn new(keys: CartKeys) -> Self {
        Self { keys }
    }

    /// Write `EMPTY` unless a session already exists. Returns whether this
    /// call created it.
    pub(crate) async fn initialise(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        store
            .set_if_absent(&self.keys.state(cart), CartState::Empty.as_str(), ttl)
            .await
    }

    pub(crate) async fn get_state(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
    ) -> Result<Option<CartState>, CartsServiceError> {
        let key = self.keys.state(cart);

        let Some(raw) = store.get(&key).await? else {
            return Ok(None);
        };

        raw.parse()
            .map(Some)
            .map_err(|_unknown| CartsServiceError::CorruptSession { key })
    }

    pub(crate) async fn put_state(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        state: CartState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        store.set(&self.keys.state(cart), state.as_str(), ttl).await
    }

    /// Reset the expiry of the item keys. Missing keys are skipped.
    pub(crate) async fn touch_items(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        store.expire(&self.keys.item_index(cart), ttl).await?;
        store.expire(&self.keys.quantities(cart), ttl).await?;

        Ok(())
    }

    /// Delete every session key, returning how many existed.
    pub(crate) async fn destroy(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
    ) -> Result<u64, StoreError> {
        store.delete(&self.keys.session(cart)).await
    }
}
