use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::LockError;
use crate::store::LockStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process lock store.
///
/// Keeps `key -> (value, expires_at)` in a single map guarded by one mutex, so
/// every operation is atomic with respect to every other. Expired entries are
/// treated as absent; every insert sweeps all expired entries out of the map,
/// so keys that are never touched again do not accumulate.
///
/// Expiry uses the tokio clock, which makes it follow paused time in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, LockError> {
        self.entries
            .lock()
            .map_err(|e| LockError::Internal(format!("memory store poisoned: {}", e)))
    }

    /// Current value of `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let now = Instant::now();
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> Result<usize, LockError> {
        let now = Instant::now();
        let entries = self.entries()?;
        Ok(entries.values().filter(|e| e.expires_at > now).count())
    }

    pub fn is_empty(&self) -> Result<bool, LockError> {
        Ok(self.len()? == 0)
    }

    /// Number of entries in the map, expired ones included.
    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }
}

/// Drop `key` if its entry has expired.
fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| e.expires_at <= now) {
        entries.remove(key);
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    fn store_name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries()?;
        entries.retain(|_, e| e.expires_at > now);

        if entries.contains_key(key) {
            debug!("Key {} already present", key);
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        debug!("Set {} (ttl {:?})", key, ttl);
        Ok(true)
    }

    #[instrument(skip(self, expected), level = "debug")]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries()?;
        purge_expired(&mut entries, key, now);

        match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                debug!("Deleted {} (value matched)", key);
                Ok(true)
            }
            Some(_) => {
                debug!("Kept {} (value mismatch)", key);
                Ok(false)
            }
            None => {
                debug!("Key {} not found", key);
                Ok(false)
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries()?;
        purge_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }
}
