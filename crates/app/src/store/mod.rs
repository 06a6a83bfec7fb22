//! Expiring key-value store port.
//!
//! Carts live entirely inside a key-value store offering strings, hashes and
//! lists with per-key expiry. Each method is one atomic command against the
//! store; nothing here spans several keys.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

mod memory;
mod timed;

pub use memory::MemoryStore;
pub use timed::TimedStore;

/// Failures of a single store command.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The command did not complete within the configured bound.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A string, hash or list command hit a key of another type.
    #[error("key {key} holds a different value type")]
    WrongType { key: String },

    #[error("field {field} of {key} is not an integer")]
    NotAnInteger { key: String, field: String },

    #[error("increment of field {field} of {key} overflows")]
    Overflow { key: String, field: String },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Expiring key-value store holding cart sessions.
#[automock]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write a string value only when the key does not exist. Returns whether
    /// the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete a string key only while it still holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Whether a live key exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Reset the expiry of an existing key. Returns `false` for a missing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining time to live; `None` for missing or persistent keys.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Read one hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Write one hash field, creating the hash without expiry if needed.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Add `delta` to an integer hash field, treating a missing field as 0.
    async fn hash_increment(&self, key: &str, field: &str, delta: i64)
    -> Result<i64, StoreError>;

    /// Delete one hash field; an emptied hash is removed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Read several hash fields in one round trip, in the order given.
    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError>;

    /// Append to a list, returning the new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Remove every occurrence of `value`, returning how many were removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// The whole list, oldest first.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
