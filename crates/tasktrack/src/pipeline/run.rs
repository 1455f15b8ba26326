use tasktrack_core::mutation::{FailureReason, MutationOutcome, PipelineState};
use tasktrack_core::record::EntityRef;

/// Tracks the state of one pipeline run and logs its transitions.
#[derive(Debug)]
pub(crate) struct Run {
    operation: &'static str,
    entity: EntityRef,
    state: PipelineState,
}

impl Run {
    pub(crate) fn new(operation: &'static str, entity: EntityRef) -> Self {
        Self {
            operation,
            entity,
            state: PipelineState::Idle,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid pipeline transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            operation = self.operation,
            entity = %self.entity,
            from = %self.state,
            to = %next,
            "Pipeline transition"
        );
        self.state = next;
    }

    /// Moves to `Failed` for a non-success outcome and hands the outcome back.
    pub(crate) fn fail(&mut self, outcome: MutationOutcome) -> MutationOutcome {
        if let MutationOutcome::InternalError { detail } = &outcome {
            tracing::error!(
                operation = self.operation,
                entity = %self.entity,
                state = %self.state,
                %detail,
                "Mutation failed"
            );
        }

        if let Some(reason) = FailureReason::from_outcome(&outcome) {
            self.advance(PipelineState::Failed(reason));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktrack_core::record::EntityType;
    use uuid::Uuid;

    fn run() -> Run {
        Run::new(
            "update",
            EntityRef::new(Uuid::new_v4(), EntityType::Task, Uuid::new_v4()),
        )
    }

    #[test]
    fn test_run_starts_idle() {
        assert_eq!(run().state(), PipelineState::Idle);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut run = run();
        run.advance(PipelineState::LockAcquiring);
        run.advance(PipelineState::LockHeld);
        run.advance(PipelineState::Writing);

        let outcome = run.fail(MutationOutcome::Conflict { current_version: 3 });

        assert_eq!(outcome, MutationOutcome::Conflict { current_version: 3 });
        assert_eq!(
            run.state(),
            PipelineState::Failed(FailureReason::Conflict)
        );
    }

    #[test]
    #[should_panic(expected = "invalid pipeline transition")]
    fn test_skipping_states_is_rejected() {
        let mut run = run();
        run.advance(PipelineState::Writing);
    }
}
