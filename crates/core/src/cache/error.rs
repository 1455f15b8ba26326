use std::time::Duration;

use thiserror::Error;

use super::serialization::SerializationError;

/// Failures of a cache backend call.
///
/// The cache is advisory: callers in the read path treat any of these as a
/// miss, and the mutation path only logs them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    /// A stored value could not be decoded.
    #[error("Corrupt cache value: {0}")]
    Serialization(String),
    /// The backend did not answer within the per-call deadline.
    #[error("Cache call exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl CacheError {
    /// Returns true if the backend may recover without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::ConnectionFailed(_) | CacheError::Timeout(_)
        )
    }
}

impl From<SerializationError> for CacheError {
    fn from(error: SerializationError) -> Self {
        CacheError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
