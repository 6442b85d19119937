//! Site configuration snapshot
//!
//! The sites file is re-read at the start of every cycle and handed to the
//! services as an immutable value, so edits take effect on the next cycle
//! without restarting the daemon.

use reqwest::Url;
use serde::Deserialize;
use sluice_core::{PipelineError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

fn default_core_count() -> u32 {
    1
}

fn default_max_attempts() -> i32 {
    5
}

/// One computing site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    /// Submission endpoint URLs
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default = "default_core_count")]
    pub core_count: u32,

    /// Site runs its own pilot, which ships the job's outputs itself
    #[serde(default)]
    pub true_pilot: bool,

    /// Jobs at this site must not upload outputs themselves
    #[serde(default)]
    pub no_upload: bool,

    /// Overrides the default retry budget
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

/// Files shipped with every job
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutableConfig {
    /// Wrapper script run as the job executable
    pub wrapper: String,
    /// Catalog helper used by the wrapper to register outputs
    pub rucio_helper: String,
    /// Runtime environment every job requests last
    pub base_rte: String,
}

/// Parsed sites file
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub sites: Vec<SiteConfig>,

    /// Storage endpoint name to the site that can read it locally
    #[serde(default)]
    pub rses: BTreeMap<String, String>,

    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,

    pub executable: ExecutableConfig,
}

impl ConfigSnapshot {
    /// Reads and parses the sites file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::ConfigMissing(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| PipelineError::ConfigMissing(format!("invalid sites file: {e}")))
    }

    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.name == name)
    }

    /// Site owning a storage endpoint
    pub fn site_for_rse(&self, rse: &str) -> Option<&SiteConfig> {
        self.rses.get(rse).and_then(|name| self.site(name))
    }

    /// Retry budget for jobs sent to `site`
    pub fn max_attempts(&self, site: Option<&SiteConfig>) -> i32 {
        site.and_then(|site| site.max_attempts)
            .unwrap_or(self.default_max_attempts)
    }

    /// Normalised endpoints a job may run at
    ///
    /// With a target site only its endpoints qualify; otherwise every
    /// configured endpoint does, first occurrence kept.
    pub fn candidate_list(&self, site: Option<&SiteConfig>) -> String {
        match site {
            Some(site) => normalize_endpoints(site.endpoints.iter().map(String::as_str)),
            None => {
                let mut seen = HashSet::new();
                let endpoints = self
                    .sites
                    .iter()
                    .flat_map(|site| site.endpoints.iter().map(String::as_str))
                    .filter(|endpoint| seen.insert(*endpoint));
                normalize_endpoints(endpoints)
            }
        }
    }

    /// Normalised endpoints of sites flagged `no_upload`
    pub fn no_upload_endpoints(&self) -> String {
        normalize_endpoints(
            self.sites
                .iter()
                .filter(|site| site.no_upload)
                .flat_map(|site| site.endpoints.iter().map(String::as_str)),
        )
    }
}

/// Reduces endpoint URLs to `host/path` and joins them with `,`
///
/// Order is preserved. Unparsable entries are skipped.
pub fn normalize_endpoints<'a>(endpoints: impl IntoIterator<Item = &'a str>) -> String {
    endpoints
        .into_iter()
        .filter_map(|endpoint| match Url::parse(endpoint) {
            Ok(url) => {
                let host = url.host_str()?;
                Some(format!("{}{}", host, url.path().trim_end_matches('/')))
            }
            Err(e) => {
                tracing::warn!("Skipping endpoint {}: {}", endpoint, e);
                None
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
