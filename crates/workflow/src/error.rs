//! Error types for the step-progression engine.
//!
//! Inline validation failures and the blank identity field are not errors:
//! they travel as [`StepReply`](crate::view::StepReply) variants so the
//! boundary can never confuse one with the other.

use thiserror::Error;

use crate::types::StepId;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The step registry is malformed. Fatal at startup.
    #[error("invalid step registry: {reason}")]
    Config { reason: String },

    /// A step id that the registry does not know.
    #[error("unknown step '{step_id}'")]
    UnknownStep { step_id: String },

    /// A pipeline id that cannot be used as a storage key.
    #[error("invalid pipeline id '{pipeline_id}': {reason}")]
    InvalidPipelineId { pipeline_id: String, reason: String },

    /// Revert aimed at a step that cannot be reverted to.
    #[error("cannot revert to step '{step_id}': {reason}")]
    InvalidRevertTarget { step_id: String, reason: String },

    /// The pipeline is finalized and must be unfinalized first.
    #[error("pipeline '{pipeline_id}' is finalized; unfinalize it first")]
    LockedPipeline { pipeline_id: String },

    /// Finalize was attempted with steps outstanding.
    #[error("pipeline '{pipeline_id}' has incomplete steps: {}", join_ids(.missing))]
    IncompletePipeline {
        pipeline_id: String,
        missing: Vec<StepId>,
    },

    /// The pipeline store failed.
    #[error("storage operation '{operation}' failed: {reason}")]
    StorageFailed { operation: String, reason: String },

    /// A state document could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(StepId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create a registry configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an unknown step error.
    pub fn unknown_step(step_id: impl Into<String>) -> Self {
        Self::UnknownStep {
            step_id: step_id.into(),
        }
    }

    /// Create an invalid pipeline id error.
    pub fn invalid_pipeline_id(pipeline_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPipelineId {
            pipeline_id: pipeline_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid revert target error.
    pub fn invalid_revert_target(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRevertTarget {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a locked pipeline error.
    pub fn locked_pipeline(pipeline_id: impl Into<String>) -> Self {
        Self::LockedPipeline {
            pipeline_id: pipeline_id.into(),
        }
    }

    /// Create an incomplete pipeline error.
    pub fn incomplete_pipeline(pipeline_id: impl Into<String>, missing: Vec<StepId>) -> Self {
        Self::IncompletePipeline {
            pipeline_id: pipeline_id.into(),
            missing,
        }
    }

    /// Create a storage failed error.
    pub fn storage_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Whether the error is a refusal the user can act on, as opposed to a
    /// programming or infrastructure failure.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LockedPipeline { .. }
                | Self::IncompletePipeline { .. }
                | Self::InvalidPipelineId { .. }
                | Self::InvalidRevertTarget { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_step("step_09");
        assert!(err.to_string().contains("step_09"));
    }

    #[test]
    fn test_incomplete_lists_missing_steps() {
        let err = Error::incomplete_pipeline(
            "hello-01",
            vec![StepId::new("step_01"), StepId::new("step_02")],
        );
        let msg = err.to_string();
        assert!(msg.contains("hello-01"));
        assert!(msg.contains("step_01, step_02"));
    }

    #[test]
    fn test_is_user_recoverable() {
        assert!(Error::locked_pipeline("p").is_user_recoverable());
        assert!(Error::incomplete_pipeline("p", Vec::new()).is_user_recoverable());
        assert!(!Error::unknown_step("x").is_user_recoverable());
        assert!(!Error::storage_failed("save", "disk full").is_user_recoverable());
    }
}
