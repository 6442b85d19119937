//! Job dispatch
//!
//! Turns `new` jobs into backend submissions. The description is rebuilt
//! from the staged config on every attempt, so a resubmission after a site
//! configuration change picks up the new settings.

use chrono::Utc;
use sluice_core::domain::job::{JobStatus, TrackedJob};
use sluice_core::domain::request::parse_key_values;
use sluice_core::domain::variant::JobVariant;
use sluice_core::dto::job::SubmissionRecord;
use sluice_core::{PipelineError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::description::{DescriptionBuilder, StagedFiles};
use super::store_error;
use crate::backend::{
    BackendHandle, DOWNLOAD_FILES, ExecutionBackend, PILOT_DOWNLOAD_FILES, Submission,
};
use crate::config::Config;
use crate::repository::JobStore;
use crate::snapshot::{ConfigSnapshot, SiteConfig};

const FAIRSHARE_LEN: usize = 50;

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn ExecutionBackend>,
    sites_file: PathBuf,
    batch_size: i64,
    job_log_dir: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            store,
            backend,
            sites_file: config.sites_file.clone(),
            batch_size: config.dispatch_batch_size,
            job_log_dir: config.job_log_dir.clone(),
        }
    }

    /// Submits up to one batch of `new` jobs, returning how many went out
    pub async fn run_cycle(&self) -> anyhow::Result<usize> {
        let snapshot = ConfigSnapshot::load(&self.sites_file).await?;
        let jobs = self
            .store
            .find_by_status(JobStatus::New, self.batch_size)
            .await?;

        if jobs.is_empty() {
            debug!("No new jobs to dispatch");
            return Ok(0);
        }

        info!("Dispatching {} job(s)", jobs.len());

        let mut submitted = 0;

        for job in jobs {
            match self.submit(&job, &snapshot, JobStatus::New).await {
                Ok(true) => submitted += 1,
                Ok(false) => warn!("Job {} changed status during dispatch", job.id),
                Err(SubmitError::NotSent(e)) => {
                    error!("Failed to dispatch job {}: {}", job.id, e);
                    self.mark_failed(&job).await;
                }
                Err(SubmitError::Unrecorded(e)) => {
                    error!(
                        "Job {} reached the backend but was not recorded, retrying next cycle: {}",
                        job.id, e
                    );
                }
            }
        }

        Ok(submitted)
    }

    /// Sends a failed job back to the backend under the same identifier
    ///
    /// A job the backend already knows is resubmitted through its handle;
    /// one that never reached the backend is submitted afresh.
    pub async fn resubmit(&self, id: Uuid) -> Result<TrackedJob> {
        let job = self
            .store
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or(PipelineError::JobNotFound(id))?;

        let invalid = PipelineError::InvalidTransition {
            from: job.status,
            to: JobStatus::Submitted,
        };
        if job.status.resubmit().is_none() {
            return Err(invalid);
        }

        let applied = match &job.backend_handle {
            Some(handle) => {
                self.backend
                    .resubmit(&BackendHandle(handle.clone()))
                    .await
                    .map_err(|e| PipelineError::StoreInsertFailed(e.to_string()))?;
                self.store
                    .update_status(id, JobStatus::Failed, JobStatus::Submitted, Utc::now())
                    .await
                    .map_err(store_error)?
            }
            None => {
                let snapshot = ConfigSnapshot::load(&self.sites_file).await?;
                self.submit(&job, &snapshot, JobStatus::Failed).await?
            }
        };

        if !applied {
            return Err(invalid);
        }

        info!("Resubmitted job {}", id);

        self.store
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or(PipelineError::JobNotFound(id))
    }

    /// Builds, submits and records one job
    ///
    /// Returns whether the store still held the job in `expected`.
    async fn submit(
        &self,
        job: &TrackedJob,
        snapshot: &ConfigSnapshot,
        expected: JobStatus,
    ) -> std::result::Result<bool, SubmitError> {
        let (submission, site_name) = self
            .prepare(job, snapshot)
            .await
            .map_err(SubmitError::NotSent)?;

        let handle = self.backend.submit(&submission).await.map_err(|e| {
            SubmitError::NotSent(PipelineError::StoreInsertFailed(e.to_string()))
        })?;

        debug!("Job {} accepted by backend as {}", job.id, handle);

        let record = SubmissionRecord {
            backend_handle: handle.0,
            max_attempts: submission.max_attempts,
            cluster_list: submission.cluster_list,
            fairshare: submission.fairshare,
            site_name,
        };

        let applied = self
            .store
            .mark_submitted(job.id, expected, &record)
            .await
            .map_err(|e| SubmitError::Unrecorded(store_error(e)))?;

        if applied {
            self.write_job_log(job, &submission.description).await;
        }

        Ok(applied)
    }

    /// Rebuilds the variant from its staged config and renders its submission
    async fn prepare(
        &self,
        job: &TrackedJob,
        snapshot: &ConfigSnapshot,
    ) -> Result<(Submission, Option<String>)> {
        let config = tokio::fs::read_to_string(&job.description_path)
            .await
            .map_err(|e| {
                PipelineError::TemplateRenderError(format!(
                    "cannot read {}: {}",
                    job.description_path, e
                ))
            })?;
        let variant = JobVariant::from_config(parse_key_values(&config))?;

        let site = variant
            .input
            .local
            .as_ref()
            .and_then(|local| snapshot.site_for_rse(&local.rse));

        let description = DescriptionBuilder::new(snapshot).build(
            &variant,
            StagedFiles {
                config_path: &job.description_path,
                template_path: &job.template_path,
            },
            site,
        )?;

        let cluster_list = snapshot.candidate_list(site);
        if cluster_list.is_empty() {
            return Err(PipelineError::ConfigMissing(
                "no submission endpoints configured".to_string(),
            ));
        }

        let submission = Submission {
            job_id: job.id,
            description: description.render(),
            cluster_list,
            max_attempts: snapshot.max_attempts(site),
            fairshare: fairshare_tag(&job.batch_id),
            download_files: download_files(site).to_string(),
        };

        Ok((submission, site.map(|site| site.name.clone())))
    }

    async fn mark_failed(&self, job: &TrackedJob) {
        match self
            .store
            .update_status(job.id, job.status, JobStatus::Failed, Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("Job {} changed status before it could be failed", job.id),
            Err(e) => error!("Failed to mark job {} failed: {}", job.id, e),
        }
    }

    /// Keeps a copy of the rendered description under the job log directory
    async fn write_job_log(&self, job: &TrackedJob, description: &str) {
        let Some(root) = &self.job_log_dir else {
            return;
        };

        let dir = root.join(job.created_at.format("%Y-%m-%d").to_string());
        let path = dir.join(format!("{}.xrsl", job.id));

        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, description).await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write job log {}: {}", path.display(), e);
        }
    }
}

/// Why a submission did not complete
enum SubmitError {
    /// The backend never accepted the job
    NotSent(PipelineError),
    /// The backend holds the job but the store did not record it
    Unrecorded(PipelineError),
}

impl From<SubmitError> for PipelineError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::NotSent(e) | SubmitError::Unrecorded(e) => e,
        }
    }
}

/// Files to collect once a job at `site` is done
fn download_files(site: Option<&SiteConfig>) -> &'static str {
    match site {
        Some(site) if site.true_pilot => PILOT_DOWNLOAD_FILES,
        _ => DOWNLOAD_FILES,
    }
}

/// Fairshare tag of a batch, truncated to the backend column width
pub fn fairshare_tag(batch_id: &str) -> String {
    batch_id.chars().take(FAIRSHARE_LEN).collect()
}
