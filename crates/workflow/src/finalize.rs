//! Pipeline-wide lock.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::StateRepository;
use crate::types::PipelineId;
use crate::view::{ChainSignal, StepReply};

/// Whether finalize requires every data step to be done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// Refuse to finalize while any data step is outstanding.
    #[default]
    RequireComplete,
    /// Finalize whatever has been collected.
    AllowIncomplete,
}

impl std::str::FromStr for FinalizePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "require_complete" | "strict" => Ok(Self::RequireComplete),
            "allow_incomplete" | "permissive" => Ok(Self::AllowIncomplete),
            other => Err(format!("unknown finalize policy '{other}'")),
        }
    }
}

/// Engages and releases the finalize lock.
#[derive(Clone)]
pub struct FinalizeGate {
    repo: StateRepository,
    policy: FinalizePolicy,
}

impl FinalizeGate {
    /// Create a gate.
    pub fn new(repo: StateRepository, policy: FinalizePolicy) -> Self {
        Self { repo, policy }
    }

    /// The completeness policy in force.
    pub fn policy(&self) -> FinalizePolicy {
        self.policy
    }

    /// Lock the pipeline. Idempotent. Every done step then renders locked.
    ///
    /// # Errors
    ///
    /// Under [`FinalizePolicy::RequireComplete`], returns
    /// [`Error::IncompletePipeline`] listing the steps not yet done.
    pub async fn finalize(&self, pipeline_id: &PipelineId) -> Result<StepReply> {
        {
            let _guard = self.repo.lock(pipeline_id).await;
            let mut state = self.repo.load(pipeline_id).await?;

            if state.is_finalized() {
                debug!(pipeline_id = %pipeline_id, "Pipeline already finalized");
            } else {
                if self.policy == FinalizePolicy::RequireComplete {
                    let missing = state.missing_steps(self.repo.registry());
                    if !missing.is_empty() {
                        warn!(
                            pipeline_id = %pipeline_id,
                            missing = ?missing,
                            "Finalize refused: steps outstanding"
                        );
                        return Err(Error::incomplete_pipeline(pipeline_id.as_str(), missing));
                    }
                }
                state.set_finalized(true);
                self.repo.save(pipeline_id, &state).await?;
                info!(pipeline_id = %pipeline_id, "Pipeline finalized");
            }
        }
        Ok(self.restart(pipeline_id))
    }

    /// Release the lock. Idempotent; step data is untouched.
    pub async fn unfinalize(&self, pipeline_id: &PipelineId) -> Result<StepReply> {
        {
            let _guard = self.repo.lock(pipeline_id).await;
            let mut state = self.repo.load(pipeline_id).await?;

            if state.is_finalized() {
                state.set_finalized(false);
                self.repo.save(pipeline_id, &state).await?;
                info!(pipeline_id = %pipeline_id, "Pipeline unfinalized");
            } else {
                debug!(pipeline_id = %pipeline_id, "Pipeline was not finalized");
            }
        }
        Ok(self.restart(pipeline_id))
    }

    fn restart(&self, pipeline_id: &PipelineId) -> StepReply {
        StepReply::Restart {
            pipeline_id: pipeline_id.clone(),
            chain: ChainSignal::to(self.repo.registry().first_id().clone()),
        }
    }
}
