//! Stepline web server
//!
//! HTTP boundary for the step-progression engine: routes, reply encoding,
//! configuration, and tower middleware for CORS, tracing, and compression.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod error;
pub mod payload;
pub mod reply;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{StepConfig, StepKind, StorageConfig, WebConfig};
pub use error::{AppError, Error, ErrorResponse};
pub use routes::create_router;
pub use server::{create_app, run_server};
pub use state::AppState;
