//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// A job row to insert for one expanded variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub batch_id: String,
    pub description_path: String,
    pub template_path: String,
}

/// What the dispatcher records once the backend accepted a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub backend_handle: String,
    pub max_attempts: i32,
    pub cluster_list: String,
    pub fairshare: String,
    pub site_name: Option<String>,
}

/// Status report from the monitoring side of the execution backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: JobStatus,
}
