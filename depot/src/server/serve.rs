//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DepotError;
use crate::server::handlers::{
    blue_green_handler, deploy_handler, deployments_handler, environment_handler,
    health_handler, metrics_handler, recent_builds_handler, rollback_handler,
    submit_build_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the status API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Builds
        .route("/metrics", get(metrics_handler))
        .route("/builds", post(submit_build_handler))
        .route("/builds/recent", get(recent_builds_handler))
        // Environments
        .route("/environments/{env}", get(environment_handler))
        .route("/environments/{env}/deploy", post(deploy_handler))
        .route("/environments/{env}/rollback", post(rollback_handler))
        .route("/blue-green/deploy", post(blue_green_handler))
        .route("/deployments", get(deployments_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DepotError>>, DepotError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DepotError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DepotError::ServerError(e.to_string()))
    });

    Ok(handle)
}
