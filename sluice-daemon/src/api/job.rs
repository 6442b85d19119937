//! Job API Handlers
//!
//! HTTP endpoints for job lifecycle management.

use axum::{
    Json,
    extract::{Path, State},
};
use sluice_core::domain::job::TrackedJob;
use sluice_core::dto::job::UpdateStatusRequest;
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiResult;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrackedJob>> {
    tracing::debug!("Getting job: {}", id);

    Ok(Json(state.tracker.get_job(id).await?))
}

/// PUT /jobs/{id}/status
/// Status report from the backend monitor
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<TrackedJob>> {
    tracing::info!("Status report for job {}: {}", id, req.status);

    Ok(Json(state.tracker.report_status(id, req.status).await?))
}

/// POST /jobs/{id}/resubmit
/// Re-queues a failed job
pub async fn resubmit_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrackedJob>> {
    tracing::info!("Resubmitting job: {}", id);

    Ok(Json(state.dispatcher.resubmit(id).await?))
}
