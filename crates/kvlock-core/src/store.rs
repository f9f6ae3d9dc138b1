use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// Key-value store abstraction backing the distributed lock.
///
/// Only the three commands the lock needs are part of the contract. Each one
/// must be a single atomic operation on the store side.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Returns the store identifier (e.g., "memory", "redis").
    fn store_name(&self) -> &'static str;

    /// Set `key` to `value` with expiry `ttl`, only if `key` is absent.
    ///
    /// # Returns
    /// * `Ok(true)` - the write happened
    /// * `Ok(false)` - `key` already exists, nothing changed
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError>;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// The comparison and the delete must happen atomically on the store.
    /// Returns `Ok(true)` if the key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError>;

    /// Delete `key` unconditionally. Returns `Ok(true)` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, LockError>;
}

#[async_trait]
impl<S: LockStore + ?Sized> LockStore for Arc<S> {
    fn store_name(&self) -> &'static str {
        (**self).store_name()
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        (**self).compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, LockError> {
        (**self).delete(key).await
    }
}
