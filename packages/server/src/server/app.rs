// Application setup and router configuration

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use lead_discovery::DiscoveryPipeline;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::routes::{
    health_handler, job_progress_handler, job_stream_handler, run_now_handler, user_jobs_handler,
};

/// Shared state handed to every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AxumAppState {
    pub pipeline: Arc<DiscoveryPipeline>,
}

/// Build the router.
///
/// An empty `allowed_origins` allows any origin (development).
pub fn build_app(pipeline: Arc<DiscoveryPipeline>, allowed_origins: &[String]) -> Router {
    let app_state = AxumAppState { pipeline };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    };

    Router::new()
        .route(
            "/api/discovery/configurations/:config_id/run",
            post(run_now_handler),
        )
        .route("/api/discovery/jobs/:job_id", get(job_progress_handler))
        .route("/api/discovery/jobs/:job_id/stream", get(job_stream_handler))
        .route("/api/discovery/users/:user_id/jobs", get(user_jobs_handler))
        // Health check
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
