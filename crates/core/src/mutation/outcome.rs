//! The typed result of a pipeline operation.

use serde::Serialize;

use crate::record::VersionedRecord;

/// Message shown to end users when their edit lost an optimistic race.
pub const CONFLICT_MESSAGE: &str = "This item was changed by someone else. Reload and try again.";

/// Result of `create`, `update` or `delete`.
///
/// Every expected failure is a variant; callers branch on them instead of
/// inspecting errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    Success { record: VersionedRecord },
    /// The record moved past the caller's expected version.
    Conflict { current_version: u64 },
    /// The record does not exist or is soft-deleted.
    NotFound,
    /// The record's lease could not be acquired within policy.
    Busy,
    /// The store did not answer in time; the write may or may not have committed.
    StoreTimeout,
    /// The payload or patch failed validation.
    Invalid { reason: String },
    InternalError { detail: String },
}

impl MutationOutcome {
    pub fn success(record: VersionedRecord) -> Self {
        MutationOutcome::Success { record }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MutationOutcome::Success { .. })
    }

    /// Returns the committed record on success.
    pub fn record(&self) -> Option<&VersionedRecord> {
        match self {
            MutationOutcome::Success { record } => Some(record),
            _ => None,
        }
    }

    /// Returns true for transient failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutationOutcome::Busy | MutationOutcome::StoreTimeout)
    }

    /// Maps the outcome to an HTTP status code.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasktrack_core::mutation::MutationOutcome;
    ///
    /// let outcome = MutationOutcome::Conflict { current_version: 6 };
    /// assert_eq!(outcome.status_code(), 409);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self {
            MutationOutcome::Success { .. } => 200,
            MutationOutcome::Conflict { .. } => 409,
            MutationOutcome::NotFound => 404,
            MutationOutcome::Busy => 503,
            MutationOutcome::StoreTimeout => 504,
            MutationOutcome::Invalid { .. } => 422,
            MutationOutcome::InternalError { .. } => 500,
        }
    }

    /// Returns the message to present to an end user.
    pub fn user_message(&self) -> String {
        match self {
            MutationOutcome::Success { .. } => "Saved.".to_string(),
            MutationOutcome::Conflict { .. } => CONFLICT_MESSAGE.to_string(),
            MutationOutcome::NotFound => "This item no longer exists.".to_string(),
            MutationOutcome::Busy => {
                "Someone else is editing this item. Try again in a moment.".to_string()
            }
            MutationOutcome::StoreTimeout => {
                "The change may not have been saved. Reload to check before retrying."
                    .to_string()
            }
            MutationOutcome::Invalid { reason } => reason.clone(),
            MutationOutcome::InternalError { .. } => "Something went wrong.".to_string(),
        }
    }
}
