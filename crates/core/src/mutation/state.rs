//! States of a single pipeline run.
//!
//! ```text
//! Idle -> LockAcquiring -> LockHeld -> Writing -> Invalidating -> Auditing -> Done
//!            |                            |
//!            +------------ Failed(reason) +
//! ```

use std::fmt;

use super::MutationOutcome;

/// Why a pipeline run stopped before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Busy,
    Conflict,
    NotFound,
    StoreTimeout,
    Invalid,
    Internal,
}

impl FailureReason {
    /// Classifies a non-success outcome. Returns `None` for `Success`.
    pub fn from_outcome(outcome: &MutationOutcome) -> Option<Self> {
        match outcome {
            MutationOutcome::Success { .. } => None,
            MutationOutcome::Conflict { .. } => Some(FailureReason::Conflict),
            MutationOutcome::NotFound => Some(FailureReason::NotFound),
            MutationOutcome::Busy => Some(FailureReason::Busy),
            MutationOutcome::StoreTimeout => Some(FailureReason::StoreTimeout),
            MutationOutcome::Invalid { .. } => Some(FailureReason::Invalid),
            MutationOutcome::InternalError { .. } => Some(FailureReason::Internal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    LockAcquiring,
    LockHeld,
    Writing,
    Invalidating,
    Auditing,
    Done,
    Failed(FailureReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    ///
    /// Any non-terminal state may fail.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Idle, LockAcquiring)
            | (LockAcquiring, LockHeld)
            | (LockHeld, Writing)
            | (Writing, Invalidating)
            | (Invalidating, Auditing)
            | (Auditing, Done) => true,
            (current, Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::LockAcquiring => f.write_str("lock_acquiring"),
            PipelineState::LockHeld => f.write_str("lock_held"),
            PipelineState::Writing => f.write_str("writing"),
            PipelineState::Invalidating => f.write_str("invalidating"),
            PipelineState::Auditing => f.write_str("auditing"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(reason) => write!(f, "failed({:?})", reason),
        }
    }
}
