//! Per-call timeouts for store round trips.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;

use crate::store::{KeyValueStore, StoreError};

/// Bounds every call to the wrapped store by a fixed timeout.
///
/// An elapsed timeout becomes [`StoreError::Timeout`], which callers treat as
/// transient.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn KeyValueStore>,
    limit: Duration,
}

impl std::fmt::Debug for TimedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedStore")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl TimedStore {
    /// Bound every call on `inner` by `limit`.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, command: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(command, limit_ms = self.limit.as_millis(), "store call timed out");

                Err(StoreError::Timeout(self.limit))
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for TimedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("set", self.inner.set(key, value, ttl)).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.bounded("set_if_absent", self.inner.set_if_absent(key, value, ttl))
            .await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.bounded("delete_if_equals", self.inner.delete_if_equals(key, expected))
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded("exists", self.inner.exists(key)).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.bounded("delete", self.inner.delete(keys)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.bounded("expire", self.inner.expire(key, ttl)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.bounded("ttl", self.inner.ttl(key)).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.bounded("hash_get", self.inner.hash_get(key, field)).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.bounded("hash_set", self.inner.hash_set(key, field, value))
            .await
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.bounded("hash_increment", self.inner.hash_increment(key, field, delta))
            .await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.bounded("hash_delete", self.inner.hash_delete(key, field))
            .await
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        self.bounded("hash_multi_get", self.inner.hash_multi_get(key, fields))
            .await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.bounded("list_push", self.inner.list_push(key, value)).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.bounded("list_remove", self.inner.list_remove(key, value))
            .await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("list_range", self.inner.list_range(key)).await
    }
}
