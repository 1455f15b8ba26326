mod outcome;
mod state;

pub use outcome::{MutationOutcome, CONFLICT_MESSAGE};
pub use state::{FailureReason, PipelineState};
