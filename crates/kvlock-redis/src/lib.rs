//! Redis backend for kvlock.
//!
//! `RedisStore` implements `kvlock_core::LockStore` with `SET NX PX` for
//! acquisition and a Lua compare-and-delete script for release.

mod error;
mod store;

pub use error::redis_error;
pub use kvlock_core::{new_token, DistributedLock, LockError, LockOptions, LockStore, RetryPolicy};
pub use store::{RedisStore, RELEASE_SCRIPT};
