//! Revert with cascade invalidation.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::StateRepository;
use crate::types::{is_non_empty, PipelineId};
use crate::view::{ChainSignal, StepReply};

/// Rewinds a pipeline to an earlier step.
#[derive(Clone)]
pub struct RevertCoordinator {
    repo: StateRepository,
}

impl RevertCoordinator {
    /// Create a coordinator.
    pub fn new(repo: StateRepository) -> Self {
        Self { repo }
    }

    /// Clear the data of `step_id` and every step after it, mark `step_id`
    /// as the revert target, and restart the chain from the first step.
    ///
    /// The chain then runs through the untouched earlier steps and halts at
    /// `step_id`, which renders as input. Cleared values of `refill` steps
    /// are remembered for pre-filling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockedPipeline`] while the pipeline is finalized,
    /// [`Error::UnknownStep`] for an unknown step and
    /// [`Error::InvalidRevertTarget`] for the finalize step.
    pub async fn revert_to(&self, step_id: &str, pipeline_id: &PipelineId) -> Result<StepReply> {
        let registry = self.repo.registry();
        let target = registry.get(step_id)?;
        if target.is_finalize() {
            return Err(Error::invalid_revert_target(
                step_id,
                "use unfinalize to reopen a finalized pipeline",
            ));
        }

        let _guard = self.repo.lock(pipeline_id).await;
        let mut state = self.repo.load(pipeline_id).await?;
        if state.is_finalized() {
            warn!(pipeline_id = %pipeline_id, step_id = %target.id, "Revert refused: pipeline finalized");
            return Err(Error::locked_pipeline(pipeline_id.as_str()));
        }

        let mut cleared = Vec::new();
        for step in registry.steps_from(step_id)? {
            let Some(data) = state.clear_step(step.id.as_str()) else {
                continue;
            };
            if step.refill {
                if let Some(value) = data.get(&step.done_key).filter(|v| is_non_empty(v)) {
                    state.remember(step.id.clone(), value.clone());
                }
            }
            cleared.push(step.id.as_str());
        }

        state.set_revert_target(target.id.clone());
        self.repo.save(pipeline_id, &state).await?;

        info!(
            pipeline_id = %pipeline_id,
            step_id = %target.id,
            cleared = ?cleared,
            "Reverted pipeline"
        );

        Ok(StepReply::Restart {
            pipeline_id: pipeline_id.clone(),
            chain: ChainSignal::to(registry.first_id().clone()),
        })
    }
}
