use thiserror::Error;

use crate::record::RecordError;

/// Errors that can occur during durable store operations.
///
/// Version conflicts and missing records are not errors; they are reported
/// through [`WriteOutcome`](super::WriteOutcome).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<RecordError> for RepositoryError {
    fn from(error: RecordError) -> Self {
        RepositoryError::InvalidData(error.to_string())
    }
}

/// Result type for durable store operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
