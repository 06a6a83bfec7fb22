//! In-process expiring data-structure store.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(FxHashMap<String, String>),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries = FxHashMap<String, Entry>;

/// Expiring store kept in process memory.
///
/// Expired keys are dropped lazily whenever they are touched, and eagerly by
/// [`MemoryStore::purge_expired`]. Hashes and lists that become empty are
/// removed. Time is read from the tokio clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|_, entry| !entry.is_expired(now));

        before - entries.len()
    }

    /// Spawn a task purging expired keys on a fixed interval.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(every);

            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let purged = self.purge_expired();

                if purged > 0 {
                    debug!(purged, "purged expired keys");
                }
            }
        })
    }

    /// Live keys starting with `prefix`, sorted.
    #[must_use]
    pub fn live_keys(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock();

        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        keys.sort_unstable();

        keys
    }
}

fn live<'a>(entries: &'a mut Entries, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
    }

    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

fn hash_mut<'a>(
    entries: &'a mut Entries,
    key: &str,
    now: Instant,
) -> Result<&'a mut FxHashMap<String, String>, StoreError> {
    if live(entries, key, now).is_none() {
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(FxHashMap::default()),
                expires_at: None,
            },
        );
    }

    match entries.get_mut(key).map(|entry| &mut entry.value) {
        Some(Value::Hash(fields)) => Ok(fields),
        Some(Value::Text(_) | Value::List(_)) | None => Err(wrong_type(key)),
    }
}

fn list_mut<'a>(
    entries: &'a mut Entries,
    key: &str,
    now: Instant,
) -> Result<&'a mut Vec<String>, StoreError> {
    if live(entries, key, now).is_none() {
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::List(Vec::new()),
                expires_at: None,
            },
        );
    }

    match entries.get_mut(key).map(|entry| &mut entry.value) {
        Some(Value::List(items)) => Ok(items),
        Some(Value::Text(_) | Value::Hash(_)) | None => Err(wrong_type(key)),
    }
}

fn remove_if_empty(entries: &mut Entries, key: &str) {
    let empty = entries.get(key).is_some_and(|entry| match &entry.value {
        Value::Hash(fields) => fields.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Text(_) => false,
    });

    if empty {
        entries.remove(key);
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();

        match live(&mut entries, key, Instant::now()).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value.clone())),
            Some(Value::Hash(_) | Value::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );

        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if live(&mut entries, key, now).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );

        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();

        let matches = match live(&mut entries, key, Instant::now()).map(|entry| &entry.value) {
            None => false,
            Some(Value::Text(value)) => value == expected,
            Some(Value::Hash(_) | Value::List(_)) => return Err(wrong_type(key)),
        };

        if matches {
            entries.remove(key);
        }

        Ok(matches)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();

        Ok(live(&mut entries, key, Instant::now()).is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();

        Ok(count(removed))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let Some(entry) = live(&mut entries, key, now) else {
            return Ok(false);
        };

        entry.expires_at = Some(now + ttl);

        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        Ok(live(&mut entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();

        match live(&mut entries, key, Instant::now()).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::Text(_) | Value::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();

        hash_mut(&mut entries, key, Instant::now())?.insert(field.to_string(), value.to_string());

        Ok(())
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock();
        let fields = hash_mut(&mut entries, key, Instant::now())?;

        let current = match fields.get(field) {
            None => 0,
            Some(raw) => raw.parse::<i64>().map_err(|_not_integer| StoreError::NotAnInteger {
                key: key.to_string(),
                field: field.to_string(),
            })?,
        };

        let next = current.checked_add(delta).ok_or_else(|| StoreError::Overflow {
            key: key.to_string(),
            field: field.to_string(),
        })?;

        fields.insert(field.to_string(), next.to_string());

        Ok(next)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();

        let removed = match live(&mut entries, key, Instant::now()).map(|entry| &mut entry.value) {
            None => false,
            Some(Value::Hash(fields)) => fields.remove(field).is_some(),
            Some(Value::Text(_) | Value::List(_)) => return Err(wrong_type(key)),
        };

        remove_if_empty(&mut entries, key);

        Ok(removed)
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let mut entries = self.entries.lock();

        match live(&mut entries, key, Instant::now()).map(|entry| &entry.value) {
            None => Ok(vec![None; fields.len()]),
            Some(Value::Hash(stored)) => Ok(fields
                .iter()
                .map(|field| stored.get(field).cloned())
                .collect()),
            Some(Value::Text(_) | Value::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock();
        let items = list_mut(&mut entries, key, Instant::now())?;

        items.push(value.to_string());

        Ok(count(items.len()))
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock();

        let removed = match live(&mut entries, key, Instant::now()).map(|entry| &mut entry.value) {
            None => 0,
            Some(Value::List(items)) => {
                let before = items.len();

                items.retain(|item| item != value);

                before - items.len()
            }
            Some(Value::Text(_) | Value::Hash(_)) => return Err(wrong_type(key)),
        };

        remove_if_empty(&mut entries, key);

        Ok(count(removed))
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock();

        match live(&mut entries, key, Instant::now()).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items.clone()),
            Some(Value::Text(_) | Value::Hash(_)) => Err(wrong_type(key)),
        }
    }
}
