//! Repository Module
//!
//! Data access layer for the daemon. Services only see the [`JobStore`]
//! trait, so they can be exercised against an in-memory store.

pub mod job;

pub use job::PgJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sluice_core::domain::job::{JobStatus, TrackedJob};
use sluice_core::dto::job::{NewJob, SubmissionRecord};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store returned or refused data it should not have
    #[error("store error: {0}")]
    Other(String),
}

/// Persisted job store
///
/// Status writes are compare-and-set: they only apply while the row is still
/// in the expected status and report whether they did.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts all rows of one request in a single transaction
    async fn insert_jobs(&self, jobs: Vec<NewJob>) -> Result<Vec<Uuid>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrackedJob>, StoreError>;

    /// Jobs in `status`, least recently modified first
    async fn find_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<TrackedJob>, StoreError>;

    async fn find_by_batch(&self, batch_id: &str) -> Result<Vec<TrackedJob>, StoreError>;

    /// Moves a job from `expected` to `next`
    ///
    /// `running` stamps the start time, terminal statuses the end time and
    /// `submitted` clears both.
    async fn update_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        next: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves a job from `expected` to `submitted` and records the submission
    async fn mark_submitted(
        &self,
        id: Uuid,
        expected: JobStatus,
        record: &SubmissionRecord,
    ) -> Result<bool, StoreError>;

    /// Row counts grouped by `(batch, status)`
    async fn count_by_batch_status(&self) -> Result<Vec<(String, JobStatus, i64)>, StoreError>;

    /// Moves a whole batch into the archive in one transaction
    ///
    /// The rows are locked and re-checked first; unless every member is
    /// terminal nothing is moved. Returns the number of archived jobs.
    async fn archive_batch(&self, batch_id: &str, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
