//! Health check endpoint: GET /health

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    app: String,
    steps: usize,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: state.app_name().to_string(),
        steps: state.engine.registry().len(),
    }))
}
