//! API Module
//!
//! HTTP surface for status reports and batch progress.

pub mod batch;
pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{Dispatcher, LifecycleTracker};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: Arc<LifecycleTracker>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Batch endpoints
        .route("/batches", get(batch::list_batches))
        // Job endpoints
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/status", put(job::update_status))
        .route("/jobs/{id}/resubmit", post(job::resubmit_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
