//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A job persisted by the dispatcher and followed by the lifecycle tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub batch_id: String,
    /// Staged job config the description is built from
    pub description_path: String,
    /// Staged rendered job template
    pub template_path: String,
    /// Opaque handle returned by the execution backend
    pub backend_handle: Option<String>,
    /// Submission attempts the backend may make
    pub max_attempts: Option<i32>,
    /// Comma-separated candidate endpoints
    pub cluster_list: Option<String>,
    pub fairshare: Option<String>,
    pub site_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Job lifecycle status
///
/// ```text
/// new -> submitted -> running -> finished | failed | cancelled
/// ```
///
/// `new` and `submitted` may also end directly. A failed job only leaves
/// `failed` through [`JobStatus::resubmit`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Submitted,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::New,
        JobStatus::Submitted,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Transition table for ordinary status updates
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (New, Submitted)
                | (New, Failed)
                | (New, Cancelled)
                | (Submitted, Running)
                | (Submitted, Finished)
                | (Submitted, Failed)
                | (Submitted, Cancelled)
                | (Running, Finished)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Status after an explicit resubmission, if allowed from this status
    pub fn resubmit(self) -> Option<JobStatus> {
        match self {
            JobStatus::Failed => Some(JobStatus::Submitted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Submitted => "submitted",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {s}"))
    }
}

/// Projection of a job kept after its batch is archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedJob {
    pub id: Uuid,
    pub site_name: Option<String>,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub batch_id: String,
}

impl ArchivedJob {
    /// Builds the archive row, backfilling missing timestamps
    ///
    /// A single missing timestamp copies the other; with neither present
    /// both are set to `now`.
    pub fn from_job(job: &TrackedJob, now: DateTime<Utc>) -> Self {
        let (start_time, end_time) = match (job.start_time, job.end_time) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, start),
            (None, Some(end)) => (end, end),
            (None, None) => (now, now),
        };

        Self {
            id: job.id,
            site_name: job.site_name.clone(),
            status: job.status,
            start_time,
            end_time,
            batch_id: job.batch_id.clone(),
        }
    }
}
