//! Lease Repository
//!
//! A lease is a short-lived `{prefix}:{cart}:lock` key holding a random
//! token. Only the holder of the token may release it, and the key expires on
//! its own if the holder never does.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use uuid::Uuid;

use crate::{
    domain::carts::keys::CartKeys,
    ids::CartId,
    store::{KeyValueStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LeaseSettings {
    /// Expiry of the lease key.
    pub(crate) ttl: Duration,

    /// How long to keep retrying before giving up.
    pub(crate) wait: Duration,

    /// Pause between attempts.
    pub(crate) retry_interval: Duration,
}

/// A held lease.
#[derive(Debug)]
#[must_use = "a lease should be released once the guarded work is done"]
pub(crate) struct Lease {
    key: String,
    token: String,
}

#[derive(Debug, Clone)]
pub(crate) struct KvLeaseRepository {
    keys: CartKeys,
    settings: LeaseSettings,
}

impl KvLeaseRepository {
    #[must_use]
    pub(crate) fn new(keys: CartKeys, settings: LeaseSettings) -> Self {
        Self { keys, settings }
    }

    /// Acquire the lease for `cart`, retrying until the wait runs out.
    /// Returns `None` when another holder kept it the whole time.
    pub(crate) async fn acquire(
        &self,
        store: &dyn KeyValueStore,
        cart: &CartId,
    ) -> Result<Option<Lease>, StoreError> {
        let key = self.keys.lease(cart);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.settings.wait;

        loop {
            if store.set_if_absent(&key, &token, self.settings.ttl).await? {
                return Ok(Some(Lease { key, token }));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            sleep(self.settings.retry_interval).await;
        }
    }

    /// Release a lease. Returns `false` when it had already expired, whether
    /// or not someone else has taken it since.
    pub(crate) async fn release(
        &self,
        store: &dyn KeyValueStore,
        lease: Lease,
    ) -> Result<bool, StoreError> {
        store.delete_if_equals(&lease.key, &lease.token).await
    }
}
