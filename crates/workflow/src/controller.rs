//! Step controller: the three-phase view state machine and the submit cycle.
//!
//! A step's phase is never stored. It is derived on every read:
//!
//! | Phase     | Condition (checked in order)                       | Chains? |
//! |-----------|----------------------------------------------------|---------|
//! | Locked    | pipeline finalized and step done                   | yes     |
//! | Completed | step done and not the revert target                | yes     |
//! | Input     | otherwise                                          | no      |

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::handler::HandlerRegistry;
use crate::state::PipelineState;
use crate::storage::StateRepository;
use crate::types::{
    display_value, is_non_empty, PipelineId, StepDescriptor, RESERVED_PIPELINE_IDS,
};
use crate::view::{ChainSignal, Phase, Rendered, StepReply, StepView};

/// Raw form payload of a submit, field name to value.
pub type FormData = HashMap<String, String>;

/// Phase of a data step under `state`.
pub fn phase_of(step: &StepDescriptor, state: &PipelineState) -> Phase {
    let done = state.is_done(step);
    if state.is_finalized() && done {
        Phase::Locked
    } else if done && !state.is_revert_target(&step.id) {
        Phase::Completed
    } else {
        Phase::Input
    }
}

/// Renders steps and applies submits.
#[derive(Clone)]
pub struct StepController {
    repo: StateRepository,
    handlers: Arc<HandlerRegistry>,
}

impl StepController {
    /// Create a controller.
    pub fn new(repo: StateRepository, handlers: Arc<HandlerRegistry>) -> Self {
        Self { repo, handlers }
    }

    /// Render a step of a pipeline. Pure read; an unknown pipeline renders
    /// as fresh state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStep`] for an id the registry does not know.
    pub async fn render(&self, step_id: &str, pipeline_id: &PipelineId) -> Result<Rendered> {
        let step = self.repo.registry().get(step_id)?;
        let state = self.repo.load(pipeline_id).await?;
        self.render_state(step, &state)
    }

    /// Render a step against an already loaded state.
    pub fn render_state(&self, step: &StepDescriptor, state: &PipelineState) -> Result<Rendered> {
        let registry = self.repo.registry();

        if step.is_finalize() {
            return Ok(Rendered::halted(StepView::Finalize {
                step_id: step.id.clone(),
                finalized: state.is_finalized(),
                missing: state.missing_steps(registry),
            }));
        }

        let handler = self.handlers.get(step.id.as_str());
        let rendered = match (phase_of(step, state), state.done_value(step)) {
            (Phase::Locked, Some(value)) => Rendered::new(
                StepView::Locked {
                    step_id: step.id.clone(),
                    label: step.label.clone(),
                    value: value.clone(),
                    summary: handler.summarize(step, value),
                },
                Some(registry.next_id(step.id.as_str())?),
            ),
            (Phase::Completed, Some(value)) => Rendered::new(
                StepView::Completed {
                    step_id: step.id.clone(),
                    label: step.label.clone(),
                    value: value.clone(),
                    summary: handler.summarize(step, value),
                },
                Some(registry.next_id(step.id.as_str())?),
            ),
            _ => Rendered::halted(StepView::Input {
                step_id: step.id.clone(),
                label: step.label.clone(),
                field: step.done_key.clone(),
                prefill: self.prefill(step, state)?,
                error: None,
            }),
        };
        Ok(rendered)
    }

    /// Validate and persist a step's input.
    ///
    /// Blank or rejected input yields an input view with an inline message
    /// and leaves state untouched. Accepted input is written under the
    /// step's done key in one guarded read-modify-write, clearing the revert
    /// target if it named this step, and the completed view chains onward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStep`] for an unknown or terminal step and
    /// [`Error::LockedPipeline`] if the pipeline is finalized.
    pub async fn submit(
        &self,
        step_id: &str,
        pipeline_id: &PipelineId,
        form: &FormData,
    ) -> Result<StepReply> {
        let step = self.repo.registry().get(step_id)?;
        if step.is_finalize() {
            return Err(Error::unknown_step(format!("{step_id} does not accept input")));
        }

        let raw = form.get(&step.done_key).map_or("", |v| v.trim());
        if raw.is_empty() {
            debug!(pipeline_id = %pipeline_id, step_id = %step.id, "Rejected blank input");
            return Ok(rejected(step, None, format!("{} is required", step.label)));
        }

        let handler = self.handlers.get(step_id);
        let value = match handler.parse(step, raw) {
            Ok(value) if is_non_empty(&value) => value,
            Ok(_) => {
                debug!(pipeline_id = %pipeline_id, step_id = %step.id, "Handler produced empty value");
                return Ok(rejected(step, Some(raw), format!("{} is required", step.label)));
            }
            Err(message) => {
                debug!(
                    pipeline_id = %pipeline_id,
                    step_id = %step.id,
                    handler = handler.name(),
                    reason = %message,
                    "Rejected input"
                );
                return Ok(rejected(step, Some(raw), message));
            }
        };

        let state = {
            let _guard = self.repo.lock(pipeline_id).await;
            let mut state = self.repo.load(pipeline_id).await?;
            if state.is_finalized() {
                warn!(pipeline_id = %pipeline_id, step_id = %step.id, "Submit refused: pipeline finalized");
                return Err(Error::locked_pipeline(pipeline_id.as_str()));
            }
            state.record(step, value);
            self.repo.save(pipeline_id, &state).await?;
            state
        };

        info!(pipeline_id = %pipeline_id, step_id = %step.id, "Step submitted");
        Ok(StepReply::View(self.render_state(step, &state)?))
    }

    /// Landing-page identity submit.
    ///
    /// A blank id is not a validation error: it means the user wants a
    /// fresh pipeline, so the reply is [`StepReply::Refresh`]. Otherwise the
    /// pipeline is created if absent and the chain starts at the first step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPipelineId`] for an id that is not a valid key
    /// or that collides with a built-in route.
    pub async fn start(&self, raw_pipeline_id: &str) -> Result<StepReply> {
        if raw_pipeline_id.trim().is_empty() {
            info!("Blank pipeline id, requesting full refresh");
            return Ok(StepReply::Refresh);
        }

        let pipeline_id = PipelineId::parse(raw_pipeline_id)?;
        if RESERVED_PIPELINE_IDS.contains(&pipeline_id.as_str()) {
            return Err(Error::invalid_pipeline_id(
                raw_pipeline_id,
                "reserved for a built-in route",
            ));
        }
        {
            let _guard = self.repo.lock(&pipeline_id).await;
            if self.repo.load_existing(&pipeline_id).await?.is_none() {
                self.repo.save(&pipeline_id, &PipelineState::new()).await?;
                info!(pipeline_id = %pipeline_id, "Created pipeline");
            } else {
                debug!(pipeline_id = %pipeline_id, "Resuming pipeline");
            }
        }

        Ok(StepReply::Restart {
            chain: ChainSignal::to(self.repo.registry().first_id().clone()),
            pipeline_id,
        })
    }

    /// Input pre-fill: the step's own value (current, else remembered from
    /// before a revert) when `refill` is set, otherwise the transform of the
    /// previous step's value.
    fn prefill(&self, step: &StepDescriptor, state: &PipelineState) -> Result<Option<String>> {
        if step.refill {
            let own = state
                .done_value(step)
                .or_else(|| state.remembered(step.id.as_str()).filter(|v| is_non_empty(v)));
            if let Some(value) = own {
                return Ok(Some(display_value(value)));
            }
        }

        let Some(transform) = step.transform.as_ref() else {
            return Ok(None);
        };
        let previous = self.repo.registry().previous(step.id.as_str())?;
        Ok(previous
            .and_then(|p| state.done_value(p))
            .map(|value| display_value(&transform(value))))
    }
}

fn rejected(step: &StepDescriptor, raw: Option<&str>, message: String) -> StepReply {
    StepReply::View(Rendered::halted(StepView::Input {
        step_id: step.id.clone(),
        label: step.label.clone(),
        field: step.done_key.clone(),
        prefill: raw.map(str::to_string),
        error: Some(message),
    }))
}
