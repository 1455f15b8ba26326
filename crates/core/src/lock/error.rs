use std::time::Duration;

use thiserror::Error;

/// Errors raised by a lease backend.
///
/// Contention is not an error; it is reported as
/// [`AcquireOutcome::AlreadyHeld`](super::AcquireOutcome::AlreadyHeld).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock backend connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Lock operation failed: {0}")]
    OperationFailed(String),
    #[error("Lock operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid lease TTL: {0:?}")]
    InvalidTtl(Duration),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
