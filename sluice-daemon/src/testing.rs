//! In-memory doubles of the store, catalog and backend used by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use sluice_catalog::{ClientError, ReplicaCatalog};
use sluice_core::domain::batch::is_fully_terminal;
use sluice_core::domain::job::{ArchivedJob, JobStatus, TrackedJob};
use sluice_core::domain::replica::{Did, LogicalFile, RseProtocol};
use sluice_core::dto::job::{NewJob, SubmissionRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::backend::{BackendError, BackendHandle, ExecutionBackend, Submission};
use crate::repository::{JobStore, StoreError};

pub const SITES: &str = r#"{
    "sites": [
        {
            "name": "SLAC",
            "endpoints": ["https://ce1.example:443/arex", "https://ce2.example/arex"],
            "queue": "ldmx",
            "core_count": 8,
            "max_attempts": 2
        },
        {
            "name": "LUND",
            "endpoints": ["https://lunarc.example/arex", "https://ce1.example:443/arex"],
            "catalog": "rucio://lund.example",
            "true_pilot": true,
            "no_upload": true
        }
    ],
    "rses": { "SLAC_GRIDFTP": "SLAC", "LUND_POSIX": "LUND" },
    "executable": {
        "wrapper": "/opt/ldmx/ldmxsim.sh",
        "rucio_helper": "/opt/ldmx/ldmx-simprod-rte-helper.py",
        "base_rte": "LDMX-SIMPROD-3.0"
    }
}"#;

/// Builds a logical file from `(rse, url)` pairs
pub fn logical_file(did: &str, copies: &[(&str, &str)]) -> LogicalFile {
    let did: Did = did.parse().unwrap();
    let mut rses: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (rse, url) in copies {
        rses.entry(rse.to_string()).or_default().push(url.to_string());
    }
    LogicalFile {
        scope: did.scope,
        name: did.name,
        rses,
    }
}

pub fn tracked_job(batch_id: &str, status: JobStatus) -> TrackedJob {
    let now = Utc::now();
    TrackedJob {
        id: Uuid::new_v4(),
        status,
        batch_id: batch_id.to_string(),
        description_path: "/tmp/job.config".to_string(),
        template_path: "/tmp/job.py".to_string(),
        backend_handle: None,
        max_attempts: None,
        cluster_list: None,
        fairshare: None,
        site_name: None,
        created_at: now,
        modified_at: now,
        start_time: None,
        end_time: None,
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<BTreeMap<Uuid, TrackedJob>>,
    archived: Mutex<Vec<ArchivedJob>>,
    frozen_counts: Mutex<Option<Vec<(String, JobStatus, i64)>>>,
    fail_inserts: AtomicBool,
    fail_marks: AtomicBool,
}

impl InMemoryJobStore {
    pub fn seed(&self, job: TrackedJob) -> Uuid {
        let id = job.id;
        self.jobs.lock().unwrap().insert(id, job);
        id
    }

    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    /// Makes `mark_submitted` fail until `heal` is called
    pub fn fail_marks(&self) {
        self.fail_marks.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_inserts.store(false, Ordering::SeqCst);
        self.fail_marks.store(false, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<TrackedJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<TrackedJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn archived(&self) -> Vec<ArchivedJob> {
        self.archived.lock().unwrap().clone()
    }

    /// Pins the `(batch, status)` counts to their current values
    pub fn freeze_counts(&self) {
        *self.frozen_counts.lock().unwrap() = Some(self.current_counts());
    }

    fn current_counts(&self) -> Vec<(String, JobStatus, i64)> {
        let mut counts: BTreeMap<(String, JobStatus), i64> = BTreeMap::new();
        for job in self.jobs() {
            *counts.entry((job.batch_id, job.status)).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|((batch_id, status), count)| (batch_id, status, count))
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_jobs(&self, jobs: Vec<NewJob>) -> Result<Vec<Uuid>, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Other("store offline".to_string()));
        }

        let now = Utc::now();
        let mut stored = self.jobs.lock().unwrap();
        let mut ids = Vec::new();
        // Distinct modification times keep the dispatch order deterministic
        for (offset, job) in jobs.into_iter().enumerate() {
            let mut tracked = tracked_job(&job.batch_id, JobStatus::New);
            tracked.description_path = job.description_path;
            tracked.template_path = job.template_path;
            tracked.created_at = now;
            tracked.modified_at = now + Duration::milliseconds(offset as i64);
            ids.push(tracked.id);
            stored.insert(tracked.id, tracked);
        }
        Ok(ids)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrackedJob>, StoreError> {
        Ok(self.get(id))
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<TrackedJob>, StoreError> {
        let mut jobs: Vec<TrackedJob> = self
            .jobs()
            .into_iter()
            .filter(|job| job.status == status)
            .collect();
        jobs.sort_by_key(|job| job.modified_at);
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn find_by_batch(&self, batch_id: &str) -> Result<Vec<TrackedJob>, StoreError> {
        Ok(self
            .jobs()
            .into_iter()
            .filter(|job| job.batch_id == batch_id)
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        next: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id).filter(|job| job.status == expected) else {
            return Ok(false);
        };

        job.status = next;
        job.modified_at = at;
        match next {
            JobStatus::Running => job.start_time = Some(at),
            JobStatus::Submitted => {
                job.start_time = None;
                job.end_time = None;
            }
            status if status.is_terminal() => job.end_time = Some(at),
            _ => {}
        }
        Ok(true)
    }

    async fn mark_submitted(
        &self,
        id: Uuid,
        expected: JobStatus,
        record: &SubmissionRecord,
    ) -> Result<bool, StoreError> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(StoreError::Other("store offline".to_string()));
        }

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id).filter(|job| job.status == expected) else {
            return Ok(false);
        };

        job.status = JobStatus::Submitted;
        job.backend_handle = Some(record.backend_handle.clone());
        job.max_attempts = Some(record.max_attempts);
        job.cluster_list = Some(record.cluster_list.clone());
        job.fairshare = Some(record.fairshare.clone());
        job.site_name = record.site_name.clone();
        job.modified_at = Utc::now();
        job.start_time = None;
        job.end_time = None;
        Ok(true)
    }

    async fn count_by_batch_status(&self) -> Result<Vec<(String, JobStatus, i64)>, StoreError> {
        if let Some(frozen) = self.frozen_counts.lock().unwrap().clone() {
            return Ok(frozen);
        }
        Ok(self.current_counts())
    }

    async fn archive_batch(&self, batch_id: &str, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let members: Vec<TrackedJob> = jobs
            .values()
            .filter(|job| job.batch_id == batch_id)
            .cloned()
            .collect();

        if members.is_empty() || !is_fully_terminal(members.iter().map(|job| job.status)) {
            return Ok(0);
        }

        let mut archived = self.archived.lock().unwrap();
        for job in &members {
            jobs.remove(&job.id);
            archived.push(ArchivedJob::from_job(job, now));
        }
        Ok(members.len())
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
pub struct StaticCatalog {
    datasets: HashMap<String, Vec<LogicalFile>>,
    protocols: HashMap<String, Vec<RseProtocol>>,
    failing_metadata: HashSet<String>,
    unavailable: bool,
}

impl StaticCatalog {
    pub fn with_dataset(mut self, did: &str, files: Vec<LogicalFile>) -> Self {
        self.datasets.insert(did.to_string(), files);
        self
    }

    pub fn with_protocol(mut self, rse: &str, protocol: RseProtocol) -> Self {
        self.protocols.entry(rse.to_string()).or_default().push(protocol);
        self
    }

    pub fn with_failing_metadata(mut self, did: &str) -> Self {
        self.failing_metadata.insert(did.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait]
impl ReplicaCatalog for StaticCatalog {
    async fn list_replicas(&self, did: &Did) -> sluice_catalog::Result<Vec<LogicalFile>> {
        if self.unavailable {
            return Err(ClientError::api_error(503, "service unavailable"));
        }
        self.datasets
            .get(&did.to_string())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(did.to_string()))
    }

    async fn get_metadata(&self, did: &Did) -> sluice_catalog::Result<Map<String, Value>> {
        if self.failing_metadata.contains(&did.to_string()) {
            return Err(ClientError::api_error(500, "metadata backend failure"));
        }
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), json!(did.name));
        metadata.insert("events".to_string(), json!(10000));
        Ok(metadata)
    }

    async fn get_protocols(&self, rse: &str) -> sluice_catalog::Result<Vec<RseProtocol>> {
        self.protocols
            .get(rse)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(rse.to_string()))
    }
}

// =============================================================================
// Backend
// =============================================================================

#[derive(Default)]
pub struct RecordingBackend {
    submissions: Mutex<Vec<Submission>>,
    resubmitted: Mutex<Vec<BackendHandle>>,
    reject: AtomicBool,
}

impl RecordingBackend {
    pub fn reject(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn resubmitted(&self) -> Vec<BackendHandle> {
        self.resubmitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    async fn submit(&self, submission: &Submission) -> Result<BackendHandle, BackendError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("queue full".to_string()));
        }
        let mut submissions = self.submissions.lock().unwrap();
        let position = match submissions
            .iter()
            .position(|sent| sent.job_id == submission.job_id)
        {
            Some(position) => {
                submissions[position] = submission.clone();
                position
            }
            None => {
                submissions.push(submission.clone());
                submissions.len() - 1
            }
        };
        Ok(BackendHandle(format!("backend-{}", position + 1)))
    }

    async fn resubmit(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected(format!("unknown handle {handle}")));
        }
        self.resubmitted.lock().unwrap().push(handle.clone());
        Ok(())
    }
}
