//! Job variant domain types
//!
//! A variant is one unit of parallel work expanded from a request: a copy of
//! the request fields plus the per-file or per-seed values resolved for it.

use std::collections::BTreeMap;

use crate::domain::replica::{LocalReplica, RemoteReplica, ReplicaLocation};
use crate::domain::request::{JobRequest, keys};
use crate::error::{PipelineError, Result};

/// Pileup file assigned to a variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PileupInput {
    /// Remote URL the backend fetches (and may cache)
    pub url: String,
    /// Name of the file inside the job's session directory
    pub local_name: String,
}

impl PileupInput {
    pub fn new(url: impl Into<String>, file_name: &str) -> Self {
        Self {
            url: url.into(),
            local_name: format!("./{file_name}"),
        }
    }

    /// Last path component of the URL
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

/// A request copy augmented with resolved per-variant fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobVariant {
    fields: BTreeMap<String, String>,
    pub run_number: u64,
    /// Main input file as `scope:name`
    pub input_file: Option<String>,
    pub input: ReplicaLocation,
    pub pileup: Option<PileupInput>,
    pub random_seeds: Option<(i64, i64)>,
    /// JSON document with the catalog metadata of the input file
    pub input_metadata: Option<String>,
}

impl JobVariant {
    /// Starts a variant from an independent copy of the request fields
    pub fn new(request: &JobRequest, run_number: u64) -> Self {
        Self {
            fields: request.fields().clone(),
            run_number,
            input_file: None,
            input: ReplicaLocation::default(),
            pileup: None,
            random_seeds: None,
            input_metadata: None,
        }
    }

    /// Looks up a request-level field, treating empty values as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Name part of the main input file
    pub fn input_name(&self) -> Option<&str> {
        self.input_file
            .as_deref()
            .map(|did| did.split_once(':').map_or(did, |(_, name)| name))
    }

    /// Path the job reads its main input from
    ///
    /// Without a local copy the backend stages the file into the session
    /// directory, so the job reads it from there.
    pub fn local_input_path(&self) -> Option<String> {
        match (&self.input.local, self.input_name()) {
            (Some(local), _) => Some(local.path.clone()),
            (None, Some(name)) => Some(format!("./{name}")),
            (None, None) => None,
        }
    }

    /// Renders the variant as the job config handed to the job
    pub fn to_config(&self) -> BTreeMap<String, String> {
        let mut config = self.fields.clone();

        if let Some(input_file) = &self.input_file {
            config.insert(keys::INPUT_FILE.to_string(), input_file.clone());
        }
        if let Some(path) = self.local_input_path() {
            config.insert(keys::INPUT_LOCAL.to_string(), path);
        }
        if let Some(local) = &self.input.local {
            config.insert(keys::INPUT_LOCAL_RSE.to_string(), local.rse.clone());
        }
        if let Some(remote) = &self.input.remote {
            config.insert(keys::INPUT_REMOTE.to_string(), remote.url.clone());
            config.insert(keys::INPUT_REMOTE_RSE.to_string(), remote.rse.clone());
        }
        if let Some(pileup) = &self.pileup {
            config.insert(keys::PILEUP_LOCATION.to_string(), pileup.url.clone());
            config.insert(
                keys::PILEUP_LOCATION_LOCAL.to_string(),
                pileup.local_name.clone(),
            );
        }
        if let Some(metadata) = &self.input_metadata {
            config.insert(keys::INPUT_METADATA.to_string(), metadata.clone());
        }
        if let Some((seed1, seed2)) = self.random_seeds {
            config.insert(keys::RANDOM_SEED1.to_string(), seed1.to_string());
            config.insert(keys::RANDOM_SEED2.to_string(), seed2.to_string());
        }
        config.insert(keys::RUN_NUMBER.to_string(), self.run_number.to_string());

        config
    }

    /// Rebuilds a variant from a job config written by [`JobVariant::to_config`]
    pub fn from_config(mut config: BTreeMap<String, String>) -> Result<Self> {
        let mut take = |key: &str| config.remove(key).filter(|value| !value.is_empty());

        let run_number = take(keys::RUN_NUMBER)
            .ok_or_else(|| {
                PipelineError::TemplateRenderError(format!("{} missing", keys::RUN_NUMBER))
            })?
            .parse::<u64>()
            .map_err(|_| {
                PipelineError::TemplateRenderError(format!("{} is not a number", keys::RUN_NUMBER))
            })?;

        let input_file = take(keys::INPUT_FILE);
        let local_path = take(keys::INPUT_LOCAL);
        let local = match (take(keys::INPUT_LOCAL_RSE), local_path) {
            (Some(rse), Some(path)) => Some(LocalReplica { rse, path }),
            _ => None,
        };
        let remote = match (take(keys::INPUT_REMOTE_RSE), take(keys::INPUT_REMOTE)) {
            (Some(rse), Some(url)) => Some(RemoteReplica { rse, url }),
            _ => None,
        };
        let pileup_url = take(keys::PILEUP_LOCATION);
        let pileup_local = take(keys::PILEUP_LOCATION_LOCAL);
        let pileup = pileup_url.map(|url| {
            let local_name = pileup_local.unwrap_or_else(|| {
                format!("./{}", url.rsplit('/').next().unwrap_or(url.as_str()))
            });
            PileupInput { url, local_name }
        });
        let input_metadata = take(keys::INPUT_METADATA);
        let seed = |raw: Option<String>| raw.and_then(|s| s.parse::<i64>().ok());
        let random_seeds = match (seed(take(keys::RANDOM_SEED1)), seed(take(keys::RANDOM_SEED2))) {
            (Some(seed1), Some(seed2)) => Some((seed1, seed2)),
            _ => None,
        };

        Ok(Self {
            fields: config,
            run_number,
            input_file,
            input: ReplicaLocation { local, remote },
            pileup,
            random_seeds,
            input_metadata,
        })
    }
}
