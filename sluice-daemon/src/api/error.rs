//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sluice_core::PipelineError;

use crate::repository::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Store(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Store(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::JobNotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            PipelineError::MalformedIdentifier(_)
            | PipelineError::ConfigMissing(_)
            | PipelineError::TemplateRenderError(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::job::JobStatus;
    use uuid::Uuid;

    fn status_of(err: PipelineError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_pipeline_error_status_codes() {
        assert_eq!(
            status_of(PipelineError::JobNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::InvalidTransition {
                from: JobStatus::Finished,
                to: JobStatus::Running,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PipelineError::ConfigMissing("sites".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PipelineError::StoreInsertFailed("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
