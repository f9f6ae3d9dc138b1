use thiserror::Error;

/// Errors that can occur while talking to the lock store.
///
/// Contention, timeouts and releases by a non-owner are not errors: those
/// come back as `Ok(false)` from the lock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LockError {
    /// Whether another attempt against the store may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::StoreUnavailable(_) | LockError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LockError::StoreUnavailable("connection refused".into()).is_retryable());
        assert!(LockError::Store("unexpected reply".into()).is_retryable());
        assert!(!LockError::InvalidArgument("empty key".into()).is_retryable());
        assert!(!LockError::Internal("poisoned".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = LockError::StoreUnavailable("connection refused".into());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }
}
