//! HTTP routes
//!
//! ## Route Structure
//!
//! - `GET /health` - Health check endpoint
//! - `GET /{app}` - Landing payload with a suggested pipeline id
//! - `POST /{app}/init` - Identity submit, `{pipeline_id}`
//! - `GET /{app}/pipelines` - List stored pipelines
//! - `GET /{app}/{pipeline_id}` - Every view along the chain
//! - `GET /{app}/{pipeline_id}/{step_id}` - Render one step
//! - `POST /{app}/{pipeline_id}/{step_id}_submit` - Submit a step's form
//! - `POST /{app}/{pipeline_id}/handle_revert` - Revert, `{step_id}`
//! - `POST /{app}/{pipeline_id}/finalize` - Engage the finalize lock
//! - `POST /{app}/{pipeline_id}/unfinalize` - Release the finalize lock
//!
//! `{app}` is fixed by configuration when the router is built.

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod health;
pub mod landing;
pub mod steps;

/// Create the router for `state`.
pub fn create_router(state: AppState) -> Router {
    let app = state.app_name().to_string();

    let pipeline_routes = Router::new()
        .route("/", get(landing::landing))
        .route("/init", post(landing::init))
        .route("/pipelines", get(landing::list_pipelines))
        .route("/{pipeline_id}", get(steps::walk_chain))
        .route(
            "/{pipeline_id}/{action}",
            get(steps::render_step).post(steps::post_action),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest(&format!("/{app}"), pipeline_routes)
        .with_state(state)
}
