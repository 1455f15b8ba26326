use thiserror::Error;

use super::types::EntityType;

/// Errors that can occur when validating records or applying patches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Task title cannot be empty")]
    EmptyTitle,
    #[error("Task title too long (max 200 characters)")]
    TitleTooLong,
    #[error("Project name cannot be empty")]
    EmptyName,
    #[error("Project name too long (max 100 characters)")]
    NameTooLong,
    #[error("Comment body cannot be empty")]
    EmptyBody,
    #[error("Comment body too long (max 10000 characters)")]
    BodyTooLong,
    #[error("Patch for {found} cannot be applied to a {expected}")]
    PatchTypeMismatch {
        expected: EntityType,
        found: EntityType,
    },
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
}
