//! Batch API Handlers
//!
//! Read-only views over batch progress.

use axum::{Json, extract::State};
use sluice_core::domain::batch::BatchSummary;

use super::AppState;
use crate::api::error::ApiResult;

/// GET /batches
/// Status counts of every live batch
pub async fn list_batches(State(state): State<AppState>) -> ApiResult<Json<Vec<BatchSummary>>> {
    tracing::debug!("Listing batches");

    Ok(Json(state.tracker.batch_summaries().await?))
}
