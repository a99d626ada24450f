//! Encoding of engine replies as HTTP responses.
//!
//! A chain signal becomes `"chain": {"step_id", "href"}` where `href` is the
//! URL the client fetches next. A refresh becomes the `HX-Refresh: true`
//! header plus `{"refresh": true}`.

use axum::{
    http::HeaderName,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use stepline_workflow::{ChainSignal, PipelineId, Rendered, StepId, StepReply, StepView};

/// Header asking the client to reload the whole page.
pub static HX_REFRESH: HeaderName = HeaderName::from_static("hx-refresh");

/// URL of one step of one pipeline.
pub fn step_href(app: &str, pipeline_id: &PipelineId, step_id: &StepId) -> String {
    format!("/{app}/{pipeline_id}/{step_id}")
}

/// A chain signal resolved to a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub step_id: StepId,
    pub href: String,
}

impl ChainLink {
    pub fn new(app: &str, pipeline_id: &PipelineId, signal: &ChainSignal) -> Self {
        Self {
            step_id: signal.step_id().clone(),
            href: step_href(app, pipeline_id, signal.step_id()),
        }
    }
}

/// One rendered step as sent to the client.
#[derive(Debug, Serialize)]
pub struct ViewBody<'a> {
    pub pipeline_id: &'a PipelineId,
    pub view: &'a StepView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainLink>,
}

impl<'a> ViewBody<'a> {
    pub fn new(app: &str, pipeline_id: &'a PipelineId, rendered: &'a Rendered) -> Self {
        Self {
            pipeline_id,
            view: &rendered.view,
            chain: rendered
                .chain
                .as_ref()
                .map(|signal| ChainLink::new(app, pipeline_id, signal)),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplyBody<'a> {
    View(ViewBody<'a>),
    Restart {
        pipeline_id: &'a PipelineId,
        chain: ChainLink,
    },
    Refresh {
        refresh: bool,
    },
}

/// Encode a reply for `pipeline_id`. Restart replies carry their own id.
pub fn respond(app: &str, pipeline_id: &PipelineId, reply: &StepReply) -> Response {
    match reply {
        StepReply::View(rendered) => {
            Json(ReplyBody::View(ViewBody::new(app, pipeline_id, rendered))).into_response()
        }
        StepReply::Restart { pipeline_id, chain } => Json(ReplyBody::Restart {
            chain: ChainLink::new(app, pipeline_id, chain),
            pipeline_id,
        })
        .into_response(),
        StepReply::Refresh => refresh(),
    }
}

/// Full client refresh.
pub fn refresh() -> Response {
    (
        [(HX_REFRESH.clone(), "true")],
        Json(ReplyBody::Refresh { refresh: true }),
    )
        .into_response()
}
