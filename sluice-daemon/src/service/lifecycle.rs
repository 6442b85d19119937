//! Job lifecycle tracking
//!
//! Applies status reports from the monitoring side of the backend and moves
//! finished batches out of the live table.

use chrono::Utc;
use sluice_core::domain::batch::{BatchSummary, summarize};
use sluice_core::domain::job::{JobStatus, TrackedJob};
use sluice_core::{PipelineError, Result};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::store_error;
use crate::repository::{JobStore, StoreError};

/// Statuses the backend monitor may report
const REPORTABLE: [JobStatus; 4] = [
    JobStatus::Running,
    JobStatus::Finished,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

pub struct LifecycleTracker {
    store: Arc<dyn JobStore>,
}

impl LifecycleTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn get_job(&self, id: Uuid) -> Result<TrackedJob> {
        self.store
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or(PipelineError::JobNotFound(id))
    }

    pub async fn batch_summaries(&self) -> std::result::Result<Vec<BatchSummary>, StoreError> {
        Ok(summarize(self.store.count_by_batch_status().await?))
    }

    /// Applies a status reported for a job
    ///
    /// Only the backend monitor's statuses are accepted; `submitted` is
    /// reserved for dispatch and resubmission.
    pub async fn report_status(&self, id: Uuid, next: JobStatus) -> Result<TrackedJob> {
        let job = self.get_job(id).await?;

        if !REPORTABLE.contains(&next) || !job.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        let applied = self
            .store
            .update_status(id, job.status, next, Utc::now())
            .await
            .map_err(store_error)?;

        if !applied {
            // Lost a race; report against whatever the job holds now
            let current = self.get_job(id).await?;
            return Err(PipelineError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        info!("Job {}: {} -> {}", id, job.status, next);

        self.get_job(id).await
    }

    /// Archives every batch whose jobs have all reached a terminal status
    ///
    /// Returns the number of jobs archived.
    pub async fn archive_batches(&self) -> std::result::Result<usize, StoreError> {
        let summaries = self.batch_summaries().await?;
        let mut archived = 0;

        for summary in summaries.iter().filter(|summary| summary.is_archivable()) {
            debug!(
                "Batch {} is done with {} job(s)",
                summary.batch_id,
                summary.total()
            );
            match self.archive_batch(&summary.batch_id).await {
                Ok(count) => archived += count,
                Err(e) => error!("Failed to archive batch {}: {}", summary.batch_id, e),
            }
        }

        Ok(archived)
    }

    async fn archive_batch(&self, batch_id: &str) -> std::result::Result<usize, StoreError> {
        // Counts may be stale by now; the store re-checks under lock
        let archived = self.store.archive_batch(batch_id, Utc::now()).await?;

        if archived == 0 {
            debug!("Batch {} has active jobs again, skipping", batch_id);
        } else {
            info!("Archived {} job(s) of batch {}", archived, batch_id);
        }

        Ok(archived)
    }
}
