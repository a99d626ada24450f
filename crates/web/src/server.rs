//! Server setup with Tower middleware

use std::future::Future;

use axum::{Router, http::HeaderValue, http::Method};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::WebConfig;
use crate::error::Error;
use crate::routes;
use crate::state::AppState;

/// Create the application router with middleware.
///
/// # Errors
///
/// Returns an error if the CORS origin is not a valid header value.
pub fn create_app(state: AppState, cors_origin: &str) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", cors_origin);

    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(routes::create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    ))
}

/// Bind `config.bind_address` and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the engine cannot be built, the address cannot be
/// bound, or the server fails.
pub async fn run_server<F>(config: &WebConfig, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::from_config(config).await?;
    let app = create_app(state, &config.cors_origin)?;

    let listener = TcpListener::bind(config.bind_address.as_str()).await?;
    info!(
        address = %config.bind_address,
        app = %config.app_name,
        "Stepline server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
