//! Shared handler state.

use std::sync::Arc;

use stepline_workflow::PipelineEngine;
use tracing::info;

use crate::config::WebConfig;
use crate::error::Error;

/// State handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PipelineEngine>,
}

impl AppState {
    pub fn new(engine: Arc<PipelineEngine>) -> Self {
        Self { engine }
    }

    /// Build the engine described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub async fn from_config(config: &WebConfig) -> Result<Self, Error> {
        config.validate()?;
        let (registry, handlers) = config.build_registry()?;
        let store = config.open_store().await?;

        info!(
            app = %config.app_name,
            steps = registry.len(),
            finalize_policy = ?config.finalize_policy,
            "Pipeline engine ready"
        );

        let engine = PipelineEngine::new(
            Arc::new(registry),
            store,
            Arc::new(handlers),
            config.engine_config(),
        );
        Ok(Self::new(Arc::new(engine)))
    }

    /// First path segment of pipeline routes.
    pub fn app_name(&self) -> &str {
        &self.engine.config().app_name
    }
}
