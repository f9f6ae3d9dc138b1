use kvlock_core::LockError;
use redis::RedisError;

/// Convert a `RedisError` into a `LockError`.
///
/// Transport faults (I/O, refused or dropped connections, timeouts) become
/// `StoreUnavailable`; anything the server answered but we could not use
/// becomes `Store`.
pub fn redis_error(err: RedisError) -> LockError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        LockError::StoreUnavailable(format!("Redis: {}", err))
    } else {
        LockError::Store(format!("Redis: {}", err))
    }
}
