use axum::{extract::Extension, http::StatusCode, Json};
use lead_discovery::evasion::ProxyStatus;
use serde::Serialize;

use crate::server::app::AxumAppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    scheduler: SchedulerHealth,
    proxies: ProxyHealth,
}

#[derive(Serialize)]
pub struct SchedulerHealth {
    scheduled_configurations: usize,
    tracked_jobs: usize,
}

#[derive(Serialize)]
pub struct ProxyHealth {
    healthy: usize,
    total: usize,
    pool: Vec<ProxyStatus>,
}

/// Health check endpoint
///
/// Reports scheduled timers, tracked jobs and proxy pool health.
/// Returns 503 Service Unavailable once the pipeline has shut down.
pub async fn health_handler(
    Extension(state): Extension<AxumAppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let pipeline = &state.pipeline;
    let evasion = pipeline.evasion();

    let scheduler = SchedulerHealth {
        scheduled_configurations: pipeline.scheduler().scheduled_count().await,
        tracked_jobs: pipeline.registry().len(),
    };
    let proxies = ProxyHealth {
        healthy: evasion.pool().healthy_count(),
        total: evasion.pool().len(),
        pool: evasion.pool().snapshot(),
    };

    let is_healthy = !evasion.is_closed();
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            scheduler,
            proxies,
        }),
    )
}
