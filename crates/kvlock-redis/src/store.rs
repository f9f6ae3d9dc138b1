use std::time::Duration;

use async_trait::async_trait;
use kvlock_core::{LockError, LockStore};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, instrument};

use crate::error::redis_error;

/// Lua body for the owner-verified release.
///
/// Runs atomically on the server: deletes `KEYS[1]` only while it still holds
/// `ARGV[1]`, and returns the number of deleted keys (0 or 1).
pub const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

/// Redis-backed lock store.
///
/// Uses a `ConnectionManager`, which multiplexes commands over one connection
/// and reconnects on failure. Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    release_script: Script,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g., "redis://localhost:6379").
    pub async fn open(url: &str) -> Result<Self, LockError> {
        let client = Client::open(url).map_err(|e| {
            LockError::InvalidArgument(format!("Invalid Redis URL: {}", e))
        })?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error)?;
        debug!("Connected to Redis");
        Ok(Self::from_manager(conn))
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl LockStore for RedisStore {
    fn store_name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();

        // SET replies OK when written and nil when NX refused the write
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("SET {} NX PX {} -> {:?}", key, ttl_ms, reply);
        Ok(reply.is_some())
    }

    #[instrument(skip(self, expected), level = "debug")]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("Release script on {} -> {}", key, deleted);
        Ok(deleted == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("DEL {} -> {}", key, removed);
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let err = RedisStore::open("invalid://url").await.unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
    }
}
