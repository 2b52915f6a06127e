//! Discovery endpoints.
//!
//! - `POST /api/discovery/configurations/:config_id/run` starts a run and
//!   returns 202 with the job id before the run finishes
//! - `GET /api/discovery/jobs/:job_id` returns the job's progress
//! - `GET /api/discovery/users/:user_id/jobs` lists a user's live and recent jobs

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lead_discovery::{JobSnapshot, PipelineError, ProgressView, RunTicket};
use serde::Serialize;
use uuid::Uuid;

use crate::server::app::AxumAppState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error response with a JSON body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = match &error {
            PipelineError::ConfigurationNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::UserInactive(_) => StatusCode::CONFLICT,
            _ => {
                tracing::error!(error = %error, "Discovery request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Start a discovery run for a configuration.
pub async fn run_now_handler(
    Extension(state): Extension<AxumAppState>,
    Path(config_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunTicket>), ApiError> {
    let ticket = state.pipeline.run_now(config_id).await?;
    tracing::info!(job_id = %ticket.job_id, config_id = %config_id, "Run requested");
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

pub async fn job_progress_handler(
    Extension(state): Extension<AxumAppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ProgressView>, ApiError> {
    state
        .pipeline
        .progress(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("job not found: {}", job_id)))
}

/// Newest first.
pub async fn user_jobs_handler(
    Extension(state): Extension<AxumAppState>,
    Path(user_id): Path<Uuid>,
) -> Json<Vec<JobSnapshot>> {
    Json(state.pipeline.jobs_for_user(user_id))
}
