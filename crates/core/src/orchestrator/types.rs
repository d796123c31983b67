//! Types for the ingest orchestrator.

use thiserror::Error;
use uuid::Uuid;

use crate::job::InvalidTransition;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A job was asked to make a stage change the state machine forbids.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The runner returned without putting the job in a terminal stage.
    #[error("job {0} finished without an outcome")]
    MissingOutcome(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStage;

    #[test]
    fn test_invalid_transition_message() {
        let err: OrchestratorError = InvalidTransition {
            from: JobStage::Done,
            to: JobStage::Claimed,
        }
        .into();
        assert_eq!(err.to_string(), "invalid job transition from DONE to CLAIMED");
    }
}
