//! Landing endpoints: GET /{app}, POST /{app}/init, GET /{app}/pipelines

use axum::{
    extract::State,
    response::{Json, Response},
};
use serde::{Deserialize, Serialize};
use stepline_workflow::{PipelineId, PipelineSummary, StepId, StepReply};
use tracing::debug;

use crate::error::Result;
use crate::payload::Payload;
use crate::reply::{refresh, respond};
use crate::state::AppState;

/// Step listed on the landing page.
#[derive(Debug, Serialize)]
pub struct StepInfo {
    id: StepId,
    label: String,
}

/// Response for the landing page
#[derive(Debug, Serialize)]
pub struct LandingResponse {
    app: String,
    suggested_pipeline_id: PipelineId,
    steps: Vec<StepInfo>,
}

/// Identity submit payload. A missing field counts as blank.
#[derive(Debug, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pipeline_id: String,
}

/// Response for the pipeline listing
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pipelines: Vec<PipelineSummary>,
}

/// GET /{app} - Landing payload
pub async fn landing(State(state): State<AppState>) -> Result<Json<LandingResponse>> {
    let suggested_pipeline_id = state.engine.suggest_pipeline_id().await?;
    let steps = state
        .engine
        .registry()
        .steps()
        .iter()
        .map(|step| StepInfo {
            id: step.id.clone(),
            label: step.label.clone(),
        })
        .collect();

    Ok(Json(LandingResponse {
        app: state.app_name().to_string(),
        suggested_pipeline_id,
        steps,
    }))
}

/// POST /{app}/init - Start or resume a pipeline
///
/// A blank id answers with a full refresh so the client reloads the landing
/// page and picks up a freshly suggested id.
pub async fn init(
    State(state): State<AppState>,
    Payload(req): Payload<InitRequest>,
) -> Result<Response> {
    let reply = state.engine.start(&req.pipeline_id).await?;
    match &reply {
        StepReply::Restart { pipeline_id, .. } => Ok(respond(state.app_name(), pipeline_id, &reply)),
        StepReply::Refresh | StepReply::View(_) => {
            debug!("Identity submit answered with refresh");
            Ok(refresh())
        }
    }
}

/// GET /{app}/pipelines - List stored pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> Result<Json<ListResponse>> {
    let pipelines = state.engine.list_pipelines().await?;
    Ok(Json(ListResponse { pipelines }))
}
