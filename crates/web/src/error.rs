//! Error handling with RFC 7807 Problem Details for JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use stepline_workflow::StepId;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Conflict: {detail}")]
    Incomplete { detail: String, missing: Vec<StepId> },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Incomplete { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<stepline_workflow::Error> for AppError {
    fn from(err: stepline_workflow::Error) -> Self {
        use stepline_workflow::Error as E;

        match err {
            E::UnknownStep { .. } => AppError::NotFound(err.to_string()),
            E::InvalidPipelineId { .. } | E::InvalidRevertTarget { .. } => {
                AppError::BadRequest(err.to_string())
            }
            E::LockedPipeline { .. } => AppError::Conflict(err.to_string()),
            E::IncompletePipeline { ref missing, .. } => AppError::Incomplete {
                missing: missing.clone(),
                detail: err.to_string(),
            },
            E::Config { .. } | E::StorageFailed { .. } | E::Serialization { .. } => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

/// RFC 7807 Problem Details for HTTP APIs
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    problem_type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<StepId>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: None,
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
            missing: Vec::new(),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let title = status
            .canonical_reason()
            .map_or_else(|| "Error".to_string(), str::to_string);

        let mut response = Self::new(status, title, err.to_string());
        if let AppError::Incomplete { missing, .. } = err {
            response.missing = missing.clone();
        }
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let response = ErrorResponse::from_error(&self);
        (status, Json(response)).into_response()
    }
}

/// Startup and server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] ::axum::http::header::InvalidHeaderValue),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration value rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Engine setup failed
    #[error("Engine error: {0}")]
    Engine(#[from] stepline_workflow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_workflow::Error as EngineError;

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::unknown_step("zz"), StatusCode::NOT_FOUND),
            (
                EngineError::invalid_pipeline_id("a/b", "bad"),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::invalid_revert_target("finalize", "terminal"),
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::locked_pipeline("p"), StatusCode::CONFLICT),
            (
                EngineError::incomplete_pipeline("p", vec![StepId::new("b")]),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::storage_failed("save", "disk full"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_problem_details_carry_missing_steps() {
        let err = AppError::from(EngineError::incomplete_pipeline(
            "p",
            vec![StepId::new("b"), StepId::new("c")],
        ));
        let body = serde_json::to_value(ErrorResponse::from_error(&err)).ok();

        assert_eq!(
            body.as_ref().map(|b| b["missing"].clone()),
            Some(serde_json::json!(["b", "c"]))
        );
        assert_eq!(body.map(|b| b["status"].clone()), Some(serde_json::json!(409)));
    }

    #[test]
    fn test_missing_omitted_for_other_errors() {
        let body = serde_json::to_value(ErrorResponse::from_error(&AppError::NotFound(
            "x".to_string(),
        )))
        .ok();
        assert!(body.is_some_and(|b| b.get("missing").is_none()));
    }
}
