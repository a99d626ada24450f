//! Pipeline engine facade.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::{FormData, StepController};
use crate::error::Result;
use crate::finalize::{FinalizeGate, FinalizePolicy};
use crate::handler::HandlerRegistry;
use crate::registry::StepRegistry;
use crate::revert::RevertCoordinator;
use crate::storage::{PipelineStore, StateRepository};
use crate::types::PipelineId;
use crate::view::{Rendered, StepReply};

/// Configuration for the pipeline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name, used as the prefix of suggested pipeline ids.
    pub app_name: String,
    /// Whether finalize requires every data step to be done.
    pub finalize_policy: FinalizePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "hello".to_string(),
            finalize_policy: FinalizePolicy::default(),
        }
    }
}

/// One row of the pipeline listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub pipeline_id: PipelineId,
    pub finalized: bool,
    /// Data steps done.
    pub completed: usize,
    /// Data steps in the registry.
    pub total: usize,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Pipeline engine.
///
/// Owns the registry and the store and routes each operation to the
/// component responsible for it:
/// - [`StepController`] renders steps and applies submits
/// - [`RevertCoordinator`] rewinds with cascade invalidation
/// - [`FinalizeGate`] engages and releases the pipeline-wide lock
pub struct PipelineEngine {
    repo: StateRepository,
    controller: StepController,
    revert: RevertCoordinator,
    gate: FinalizeGate,
    config: EngineConfig,
}

impl PipelineEngine {
    /// Create a new pipeline engine.
    pub fn new(
        registry: Arc<StepRegistry>,
        store: Arc<dyn PipelineStore>,
        handlers: Arc<HandlerRegistry>,
        config: EngineConfig,
    ) -> Self {
        let repo = StateRepository::new(registry, store);
        Self {
            controller: StepController::new(repo.clone(), handlers),
            revert: RevertCoordinator::new(repo.clone()),
            gate: FinalizeGate::new(repo.clone(), config.finalize_policy),
            repo,
            config,
        }
    }

    /// The step registry.
    pub fn registry(&self) -> &StepRegistry {
        self.repo.registry()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Identity submit from the landing page. See [`StepController::start`].
    pub async fn start(&self, raw_pipeline_id: &str) -> Result<StepReply> {
        self.controller.start(raw_pipeline_id).await
    }

    /// Render one step.
    pub async fn render(&self, step_id: &str, pipeline_id: &PipelineId) -> Result<Rendered> {
        self.controller.render(step_id, pipeline_id).await
    }

    /// Submit a step. A submit of the finalize step engages the lock.
    pub async fn submit(
        &self,
        step_id: &str,
        pipeline_id: &PipelineId,
        form: &FormData,
    ) -> Result<StepReply> {
        if self.registry().get(step_id)?.is_finalize() {
            return self.gate.finalize(pipeline_id).await;
        }
        self.controller.submit(step_id, pipeline_id, form).await
    }

    /// Revert to `step_id`. See [`RevertCoordinator::revert_to`].
    pub async fn revert_to(&self, step_id: &str, pipeline_id: &PipelineId) -> Result<StepReply> {
        self.revert.revert_to(step_id, pipeline_id).await
    }

    /// Engage the finalize lock.
    pub async fn finalize(&self, pipeline_id: &PipelineId) -> Result<StepReply> {
        self.gate.finalize(pipeline_id).await
    }

    /// Release the finalize lock.
    pub async fn unfinalize(&self, pipeline_id: &PipelineId) -> Result<StepReply> {
        self.gate.unfinalize(pipeline_id).await
    }

    /// Follow chain signals from the first step over one snapshot of the
    /// state, returning every view the client would render.
    ///
    /// Stops at the first view without a chain and never takes more hops
    /// than the registry has steps.
    pub async fn walk_chain(&self, pipeline_id: &PipelineId) -> Result<Vec<Rendered>> {
        let registry = self.registry();
        let state = self.repo.load(pipeline_id).await?;

        let mut views = Vec::new();
        let mut current = registry.first_id().clone();
        for _ in 0..registry.len() {
            let step = registry.get(current.as_str())?;
            let rendered = self.controller.render_state(step, &state)?;
            let next = rendered.chain.as_ref().map(|c| c.step_id().clone());
            views.push(rendered);
            match next {
                Some(id) => current = id,
                None => break,
            }
        }

        debug!(pipeline_id = %pipeline_id, hops = views.len(), "Walked chain");
        Ok(views)
    }

    /// Suggest an unused pipeline id of the form `{app}-{nn}`.
    pub async fn suggest_pipeline_id(&self) -> Result<PipelineId> {
        let taken: HashSet<String> = self
            .repo
            .list()
            .await?
            .into_iter()
            .map(String::from)
            .collect();

        let mut counter = 1_u32;
        let candidate = loop {
            let candidate = format!("{}-{counter:02}", self.config.app_name);
            if !taken.contains(&candidate) {
                break candidate;
            }
            counter += 1;
        };
        PipelineId::parse(&candidate)
    }

    /// Summaries of all stored pipelines, sorted by id.
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let registry = self.registry();
        let total = registry.data_steps().count();

        let mut summaries = Vec::new();
        for pipeline_id in self.repo.list().await? {
            let Some(state) = self.repo.load_existing(&pipeline_id).await? else {
                continue;
            };
            summaries.push(PipelineSummary {
                finalized: state.is_finalized(),
                completed: total.saturating_sub(state.missing_steps(registry).len()),
                total,
                created: state.created_at(),
                updated: state.updated_at(),
                pipeline_id,
            });
        }

        info!(count = summaries.len(), "Listed pipelines");
        Ok(summaries)
    }
}
