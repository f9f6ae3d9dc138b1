//! Core traits and types for kvlock.
//!
//! This crate defines the single-node distributed lock and the store contract it needs:
//! - `LockStore`: the minimal key-value collaborator (set-if-absent, compare-and-delete, delete)
//! - `DistributedLock`: acquisition, bounded retry, owner-verified release
//! - `RetryPolicy`: backoff between acquisition attempts
//! - `MemoryStore`: in-process store with TTL expiry

mod error;
mod lock;
mod memory;
mod retry;
mod store;

pub use error::LockError;
pub use lock::{new_token, DistributedLock, LockOptions};
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use store::LockStore;
