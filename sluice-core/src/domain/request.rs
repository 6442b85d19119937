//! Job request domain types
//!
//! A request file is a list of `key=value` lines dropped into the buffer
//! directory by users. It is parsed once into an immutable [`JobRequest`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Well-known request and job config keys
pub mod keys {
    pub const JOB_TEMPLATE: &str = "JobTemplate";
    pub const INPUT_DATASET: &str = "InputDataset";
    pub const PILEUP_DATASET: &str = "PileupDataset";
    pub const BATCH_ID: &str = "BatchID";
    pub const JOB_MEMORY: &str = "JobMemory";
    pub const JOB_WALL_TIME: &str = "JobWallTime";
    pub const JOB_CPU_TIME: &str = "JobCpuTime";
    pub const RUNTIME_ENVIRONMENT: &str = "RunTimeEnvironment";
    pub const FINAL_OUTPUT_DESTINATION: &str = "FinalOutputDestination";
    pub const FINAL_OUTPUT_BASE_PATH: &str = "FinalOutputBasePath";
    pub const NO_UPLOAD_SITES: &str = "NoUploadSites";
    pub const NUMBER_OF_JOBS: &str = "NumberofJobs";
    pub const RANDOM_SEED1_START: &str = "RandomSeed1SequenceStart";
    pub const RANDOM_SEED2_START: &str = "RandomSeed2SequenceStart";

    // Resolved per variant
    pub const INPUT_FILE: &str = "InputFile";
    pub const INPUT_LOCAL: &str = "InputDataLocationLocal";
    pub const INPUT_LOCAL_RSE: &str = "InputDataLocationLocalRSE";
    pub const INPUT_REMOTE: &str = "InputDataLocationRemote";
    pub const INPUT_REMOTE_RSE: &str = "InputDataLocationRemoteRSE";
    pub const PILEUP_LOCATION: &str = "PileupLocation";
    pub const PILEUP_LOCATION_LOCAL: &str = "PileupLocationLocal";
    pub const INPUT_METADATA: &str = "InputMetadata";
    pub const RUN_NUMBER: &str = "runNumber";
    pub const RANDOM_SEED1: &str = "RandomSeed1";
    pub const RANDOM_SEED2: &str = "RandomSeed2";
}

/// Parses `key=value` lines into a map
///
/// Lines are split at the first `=`; key and value are trimmed and lines
/// without a separator are ignored. Later keys overwrite earlier ones.
pub fn parse_key_values(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Renders a map back into `key=value` lines, newline terminated
pub fn render_key_values(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

/// A batch-processing request read from a request file
///
/// Never mutated after parsing; expansion clones [`JobRequest::fields`]
/// for every variant it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    fields: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn parse(content: &str) -> Self {
        Self {
            fields: parse_key_values(content),
        }
    }

    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Looks up a key, treating empty values as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Name of the template file under the templates directory
    pub fn template(&self) -> Result<&str> {
        self.get(keys::JOB_TEMPLATE)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("{} not set", keys::JOB_TEMPLATE)))
    }

    pub fn input_dataset(&self) -> Option<&str> {
        self.get(keys::INPUT_DATASET)
    }

    pub fn pileup_dataset(&self) -> Option<&str> {
        self.get(keys::PILEUP_DATASET)
    }

    pub fn final_output_destination(&self) -> Option<&str> {
        self.get(keys::FINAL_OUTPUT_DESTINATION)
    }

    /// Batch identifier, defaulting to a timestamp-derived one
    pub fn batch_id(&self, now: DateTime<Utc>) -> String {
        self.get(keys::BATCH_ID)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Batch-{}", now.format("%Y-%m-%dT%H:%M:%S")))
    }

    /// Reads a required integer field
    pub fn integer(&self, key: &str) -> Result<i64> {
        let raw = self
            .get(key)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("{key} not set")))?;
        raw.parse::<i64>()
            .map_err(|_| PipelineError::ConfigMissing(format!("{key}={raw} is not an integer")))
    }
}
