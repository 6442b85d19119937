//! Execution backend
//!
//! The grid middleware that actually runs jobs is an external system. The
//! daemon hands it a rendered description and keeps the opaque handle it
//! returns.

pub mod queue;

pub use queue::QueueBackend;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Files the backend collects from every finished job
pub const DOWNLOAD_FILES: &str = "gmlog/errors;stdout;rucio.metadata";

/// Files collected from jobs at true-pilot sites
pub const PILOT_DOWNLOAD_FILES: &str = "gmlog/errors";

/// A job ready for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job_id: Uuid,
    /// Rendered job description
    pub description: String,
    /// Comma-separated candidate endpoints
    pub cluster_list: String,
    pub max_attempts: i32,
    pub fairshare: String,
    pub download_files: String,
}

/// Opaque identifier of a job inside the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHandle(pub String);

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("backend database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Hands a job to the backend
    ///
    /// Idempotent per `job_id`: a repeated submission returns the handle of
    /// the first one.
    async fn submit(&self, submission: &Submission) -> Result<BackendHandle, BackendError>;

    /// Asks the backend to run an existing job again
    async fn resubmit(&self, handle: &BackendHandle) -> Result<(), BackendError>;
}
