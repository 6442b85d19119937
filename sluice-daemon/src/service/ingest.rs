//! Request ingestion
//!
//! Picks up request files from the buffer directory, expands them into jobs,
//! stages the rendered files and persists one `new` job per variant. A request
//! file is removed only once all of its jobs are stored, so an interrupted
//! cycle simply sees the file again.

use anyhow::Context;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sluice_catalog::ReplicaCatalog;
use sluice_core::domain::request::{JobRequest, keys, render_key_values};
use sluice_core::dto::job::NewJob;
use sluice_core::{PipelineError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::description::render_template;
use super::expander::JobExpander;
use super::replica::ReplicaResolver;
use crate::config::Config;
use crate::repository::JobStore;
use crate::snapshot::ConfigSnapshot;

pub struct Ingestor {
    store: Arc<dyn JobStore>,
    resolver: ReplicaResolver,
    configs_dir: PathBuf,
    templates_dir: PathBuf,
    staging_dir: PathBuf,
    sites_file: PathBuf,
    quiet_period: Duration,
    max_requests: usize,
}

/// Rendered files of one variant, not yet on disk
struct RenderedJob {
    config: String,
    template: String,
}

impl Ingestor {
    pub fn new(config: &Config, store: Arc<dyn JobStore>, catalog: Arc<dyn ReplicaCatalog>) -> Self {
        Self {
            store,
            resolver: ReplicaResolver::new(catalog, config.local_rses.clone()),
            configs_dir: config.configs_dir(),
            templates_dir: config.templates_dir(),
            staging_dir: config.staging_dir.clone(),
            sites_file: config.sites_file.clone(),
            quiet_period: config.quiet_period,
            max_requests: config.max_requests_per_cycle,
        }
    }

    /// Handles the pending request files, returning the number of jobs created
    pub async fn run_cycle(&self) -> anyhow::Result<usize> {
        let snapshot = ConfigSnapshot::load(&self.sites_file).await?;
        let requests = self.pending_requests().await?;

        if requests.is_empty() {
            debug!("No pending requests");
            return Ok(0);
        }

        let mut created = 0;

        for path in requests {
            match self.ingest_request(&path, &snapshot).await {
                Ok(ids) => {
                    info!("Created {} job(s) from {}", ids.len(), path.display());
                    created += ids.len();
                    remove_request(&path).await;
                }
                Err(PipelineError::StoreInsertFailed(reason)) => {
                    error!(
                        "Failed to persist jobs of {}, keeping it for the next cycle: {}",
                        path.display(),
                        reason
                    );
                }
                Err(e) if e.is_resolution_error() => {
                    error!("Cannot resolve input data of {}, dropping it: {}", path.display(), e);
                    remove_request(&path).await;
                }
                Err(e) => {
                    error!("Dropping request {}: {}", path.display(), e);
                    remove_request(&path).await;
                }
            }
        }

        Ok(created)
    }

    /// Request files old enough to be complete, oldest name first
    async fn pending_requests(&self) -> anyhow::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.configs_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.configs_dir.display()))?;

        let mut entries = tokio::fs::read_dir(&self.configs_dir)
            .await
            .with_context(|| format!("Failed to list {}", self.configs_dir.display()))?;

        let now = SystemTime::now();
        let mut pending = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.quiet_period {
                debug!("{} is still settling", entry.path().display());
                continue;
            }

            pending.push(entry.path());
        }

        pending.sort();
        pending.truncate(self.max_requests);

        Ok(pending)
    }

    async fn ingest_request(&self, path: &Path, snapshot: &ConfigSnapshot) -> Result<Vec<Uuid>> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::ConfigMissing(format!("cannot read request {}: {}", path.display(), e))
        })?;
        let request = JobRequest::parse(&content);

        let template_name = request.template()?;
        let template = tokio::fs::read_to_string(self.templates_dir.join(template_name))
            .await
            .map_err(|e| {
                PipelineError::TemplateRenderError(format!("cannot read {template_name}: {e}"))
            })?;

        let batch_id = request.batch_id(Utc::now());

        let output_base = match request.final_output_destination() {
            Some(rse) => Some(self.resolver.output_base(rse).await?),
            None => None,
        };
        let no_upload = snapshot.no_upload_endpoints();

        let mut rng = StdRng::from_entropy();
        let variants = JobExpander::new(&self.resolver)
            .expand(&request, &mut rng)
            .await?;

        let rendered = variants
            .into_iter()
            .map(|mut variant| -> Result<RenderedJob> {
                if let Some(base) = &output_base {
                    variant.set(keys::FINAL_OUTPUT_BASE_PATH, base.as_str());
                }
                if !no_upload.is_empty() {
                    variant.set(keys::NO_UPLOAD_SITES, no_upload.as_str());
                }

                Ok(RenderedJob {
                    template: render_template(&template, &variant)?,
                    config: render_key_values(&variant.to_config()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let request_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("request");

        let mut staged = Vec::with_capacity(rendered.len() * 2);
        let jobs = match self.stage_all(request_name, &batch_id, &rendered, &mut staged) {
            Ok(jobs) => jobs,
            Err(e) => {
                discard(&staged);
                return Err(PipelineError::StoreInsertFailed(format!(
                    "cannot stage job files in {}: {}",
                    self.staging_dir.display(),
                    e
                )));
            }
        };

        match self.store.insert_jobs(jobs).await {
            Ok(ids) => Ok(ids),
            Err(e) => {
                discard(&staged);
                Err(PipelineError::StoreInsertFailed(e.to_string()))
            }
        }
    }

    fn stage_all(
        &self,
        request_name: &str,
        batch_id: &str,
        rendered: &[RenderedJob],
        staged: &mut Vec<PathBuf>,
    ) -> std::io::Result<Vec<NewJob>> {
        std::fs::create_dir_all(&self.staging_dir)?;

        let mut jobs = Vec::with_capacity(rendered.len());

        for job in rendered {
            let config_path = self.stage(request_name, ".config", &job.config)?;
            staged.push(config_path.clone());
            let template_path = self.stage(request_name, ".py", &job.template)?;
            staged.push(template_path.clone());

            jobs.push(NewJob {
                batch_id: batch_id.to_string(),
                description_path: config_path.to_string_lossy().into_owned(),
                template_path: template_path.to_string_lossy().into_owned(),
            });
        }

        Ok(jobs)
    }

    fn stage(&self, request_name: &str, suffix: &str, content: &str) -> std::io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{request_name}."))
            .suffix(suffix)
            .tempfile_in(&self.staging_dir)?;
        file.write_all(content.as_bytes())?;

        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

async fn remove_request(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove request {}: {}", path.display(), e);
    }
}

fn discard(staged: &[PathBuf]) {
    for path in staged {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove staged file {}: {}", path.display(), e);
        }
    }
}
