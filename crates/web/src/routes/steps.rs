//! Step endpoints under /{app}/{pipeline_id}

use axum::{
    extract::{FromRequest, Path, Request, State},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use stepline_workflow::{FormData, PipelineId};

use crate::error::{AppError, Result};
use crate::payload::Payload;
use crate::reply::{ViewBody, respond};
use crate::state::AppState;

const SUBMIT_SUFFIX: &str = "_submit";

/// Revert payload
#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    step_id: String,
}

/// Response for the chain walk
#[derive(Debug, Serialize)]
pub struct ChainResponse<'a> {
    pipeline_id: &'a PipelineId,
    views: Vec<ViewBody<'a>>,
}

/// POST actions addressed by the last path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action<'a> {
    Submit(&'a str),
    Revert,
    Finalize,
    Unfinalize,
}

impl<'a> Action<'a> {
    fn parse(segment: &'a str) -> Result<Self> {
        match segment {
            "handle_revert" => Ok(Self::Revert),
            "finalize" => Ok(Self::Finalize),
            "unfinalize" => Ok(Self::Unfinalize),
            other => other
                .strip_suffix(SUBMIT_SUFFIX)
                .filter(|step| !step.is_empty())
                .map(Self::Submit)
                .ok_or_else(|| AppError::NotFound(format!("no action '{other}'"))),
        }
    }
}

/// GET /{app}/{pipeline_id} - Follow the chain from the first step
pub async fn walk_chain(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
) -> Result<Response> {
    let pipeline_id = PipelineId::parse(&pipeline_id)?;
    let rendered = state.engine.walk_chain(&pipeline_id).await?;
    let app = state.app_name();

    let body = ChainResponse {
        pipeline_id: &pipeline_id,
        views: rendered
            .iter()
            .map(|r| ViewBody::new(app, &pipeline_id, r))
            .collect(),
    };
    Ok(Json(body).into_response())
}

/// GET /{app}/{pipeline_id}/{step_id} - Render one step
pub async fn render_step(
    State(state): State<AppState>,
    Path((pipeline_id, step_id)): Path<(String, String)>,
) -> Result<Response> {
    let pipeline_id = PipelineId::parse(&pipeline_id)?;
    let rendered = state.engine.render(&step_id, &pipeline_id).await?;
    let body = ViewBody::new(state.app_name(), &pipeline_id, &rendered);
    Ok(Json(body).into_response())
}

/// POST /{app}/{pipeline_id}/{action} - Submit, revert, finalize, unfinalize
pub async fn post_action(
    State(state): State<AppState>,
    Path((pipeline_id, action)): Path<(String, String)>,
    request: Request,
) -> Result<Response> {
    let pipeline_id = PipelineId::parse(&pipeline_id)?;
    let engine = &state.engine;

    let reply = match Action::parse(&action)? {
        Action::Submit(step_id) => {
            let form = if engine.registry().get(step_id)?.is_finalize() {
                FormData::new()
            } else {
                let Payload(form) = Payload::<FormData>::from_request(request, &state).await?;
                form
            };
            engine.submit(step_id, &pipeline_id, &form).await?
        }
        Action::Revert => {
            let Payload(req) = Payload::<RevertRequest>::from_request(request, &state).await?;
            engine.revert_to(req.step_id.trim(), &pipeline_id).await?
        }
        Action::Finalize => engine.finalize(&pipeline_id).await?,
        Action::Unfinalize => engine.unfinalize(&pipeline_id).await?,
    };

    Ok(respond(state.app_name(), &pipeline_id, &reply))
}
