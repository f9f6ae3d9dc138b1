use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::LockError;
use crate::retry::RetryPolicy;
use crate::store::LockStore;

/// Floor for the sleep between two acquisition attempts.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Generate a fresh lock token (UUID v4).
///
/// Tokens must be unique per acquisition attempt: a collision between two
/// callers would let one release the other's lock.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Defaults used by the `*_default` operations and `run_exclusive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Maximum lifetime of a lock that is never released.
    pub ttl: Duration,
    /// How long blocking acquisition keeps retrying.
    pub retry_deadline: Duration,
    /// Delay schedule between attempts.
    pub retry: RetryPolicy,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
            retry_deadline: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Named mutual-exclusion lock backed by a shared key-value store.
///
/// Acquisition is a single `SET key token NX` with expiry; release is an
/// atomic compare-and-delete on the store, so a caller can never delete a
/// lock that now belongs to someone else. The lock keeps no record of what it
/// holds: every release is verified against the store.
///
/// Usage:
/// ```ignore
/// let lock = DistributedLock::new(store);
/// let token = new_token();
/// if lock.acquire_with_timeout("orders:42", &token, ttl, deadline).await? {
///     // critical section
///     lock.release("orders:42", &token).await?;
/// }
/// ```
///
/// # Limitations
///
/// This is a single-node lock. It assumes one non-replicated store instance
/// (or one whose failover cannot produce two primaries with divergent state).
/// With asynchronous replication, a failover between acquisition and
/// replication can let two callers hold the same key at once. A quorum lock
/// across independent instances is not provided.
#[derive(Debug, Clone)]
pub struct DistributedLock<S> {
    store: S,
    options: LockOptions,
}

impl<S: LockStore> DistributedLock<S> {
    /// Create a lock over `store` with default options.
    pub fn new(store: S) -> Self {
        Self::with_options(store, LockOptions::default())
    }

    pub fn with_options(store: S, options: LockOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Try to acquire the lock once, without waiting.
    ///
    /// # Arguments
    /// * `key` - Resource to lock
    /// * `token` - Unique identifier for this acquisition (see [`new_token`])
    /// * `ttl` - Lifetime of the lock if it is never released
    ///
    /// # Returns
    /// * `Ok(true)` - lock acquired
    /// * `Ok(false)` - lock held by someone else
    /// * `Err(_)` - invalid arguments or the store could not be reached
    #[instrument(skip(self), level = "debug")]
    pub async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        validate_acquire(key, token, ttl)?;

        let acquired = self.store.set_if_absent(key, token, ttl).await?;
        if acquired {
            debug!("Acquired lock on {} for {} (ttl {:?})", key, token, ttl);
        } else {
            debug!("Lock on {} already held (requested by {})", key, token);
        }
        Ok(acquired)
    }

    /// [`try_acquire`](Self::try_acquire) with the configured default ttl.
    pub async fn try_acquire_default(&self, key: &str, token: &str) -> Result<bool, LockError> {
        self.try_acquire(key, token, self.options.ttl).await
    }

    /// Acquire the lock, retrying until it succeeds or `retry_deadline` elapses.
    ///
    /// Store faults during an attempt count as a failed attempt, and so does
    /// an attempt that does not answer before the deadline. Only invalid
    /// arguments are returned as errors; running out of time is `Ok(false)`.
    /// Waiters are not served in FIFO order.
    ///
    /// An attempt abandoned on timeout may still have written the key on the
    /// store; that record clears when its ttl expires.
    #[instrument(skip(self), level = "debug")]
    pub async fn acquire_with_timeout(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
        retry_deadline: Duration,
    ) -> Result<bool, LockError> {
        validate_acquire(key, token, ttl)?;

        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            // A stalled round trip may not outlive the deadline
            let budget = retry_deadline
                .saturating_sub(start.elapsed())
                .max(MIN_RETRY_DELAY);
            match tokio::time::timeout(budget, self.try_acquire(key, token, ttl)).await {
                Ok(Ok(true)) => return Ok(true),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => debug!("Attempt {} on {} failed: {}", attempt + 1, key, e),
                Err(_) => debug!(
                    "Attempt {} on {} timed out after {:?}",
                    attempt + 1,
                    key,
                    budget
                ),
            }

            let elapsed = start.elapsed();
            if elapsed >= retry_deadline {
                debug!(
                    "Gave up on {} after {} attempts ({:?})",
                    key,
                    attempt + 1,
                    elapsed
                );
                return Ok(false);
            }

            let delay = self
                .options
                .retry
                .delay(attempt)
                .max(MIN_RETRY_DELAY)
                .min(retry_deadline - elapsed);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// [`acquire_with_timeout`](Self::acquire_with_timeout) with the configured
    /// default ttl and retry deadline.
    pub async fn acquire_default(&self, key: &str, token: &str) -> Result<bool, LockError> {
        self.acquire_with_timeout(key, token, self.options.ttl, self.options.retry_deadline)
            .await
    }

    /// Release the lock if `token` still owns it.
    ///
    /// # Returns
    /// * `Ok(true)` - the lock was held by `token` and is now deleted
    /// * `Ok(false)` - not the owner: the key is absent or belongs to another token
    /// * `Err(_)` - the store could not be reached; the lock may still be held
    ///   and will clear when its ttl expires
    #[instrument(skip(self), level = "debug")]
    pub async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        validate_key(key)?;
        validate_token(token)?;

        let released = self.store.compare_and_delete(key, token).await?;
        if released {
            debug!("Released lock on {} by {}", key, token);
        } else {
            debug!("Lock on {} not held by {} (no-op)", key, token);
        }
        Ok(released)
    }

    /// Delete the lock regardless of who holds it.
    ///
    /// This can release a lock owned by another caller. Meant for
    /// administrative cleanup only, never for normal application flow.
    #[instrument(skip(self), level = "debug")]
    pub async fn unsafe_release(&self, key: &str) -> Result<(), LockError> {
        validate_key(key)?;

        let existed = self.store.delete(key).await?;
        warn!("Force-released lock on {} (existed: {})", key, existed);
        Ok(())
    }

    /// Run `f` while holding the lock on `key`.
    ///
    /// Uses a fresh token with the default ttl and retry deadline. Returns
    /// `Ok(None)` if the lock could not be acquired in time. The lock is
    /// released once `f` completes; a release failure is logged and `f`'s
    /// output is still returned.
    pub async fn run_exclusive<F, Fut, T>(&self, key: &str, f: F) -> Result<Option<T>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = new_token();
        if !self.acquire_default(key, &token).await? {
            return Ok(None);
        }

        let output = f().await;

        match self.release(key, &token).await {
            Ok(true) => {}
            Ok(false) => warn!("Lock on {} expired before release by {}", key, token),
            Err(e) => warn!("Failed to release lock on {}: {} (clears on ttl)", key, e),
        }
        Ok(Some(output))
    }
}

fn validate_key(key: &str) -> Result<(), LockError> {
    if key.is_empty() {
        return Err(LockError::InvalidArgument("lock key must not be empty".into()));
    }
    Ok(())
}

fn validate_token(token: &str) -> Result<(), LockError> {
    if token.is_empty() {
        return Err(LockError::InvalidArgument("lock token must not be empty".into()));
    }
    Ok(())
}

fn validate_acquire(key: &str, token: &str, ttl: Duration) -> Result<(), LockError> {
    validate_key(key)?;
    validate_token(token)?;
    if ttl.as_millis() == 0 {
        return Err(LockError::InvalidArgument(format!(
            "lock ttl must be at least 1ms, got {:?}",
            ttl
        )));
    }
    Ok(())
}
