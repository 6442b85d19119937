//! Replica domain types
//!
//! Structures returned by the replica catalog and the classification of a
//! file's physical copies relative to the storage endpoints known locally.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

const FILE_SCHEME: &str = "file://";

/// Logical data identifier in the form `scope:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Did {
    pub scope: String,
    pub name: String,
}

impl FromStr for Did {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(scope), Some(name), None) if !scope.is_empty() && !name.is_empty() => Ok(Self {
                scope: scope.to_string(),
                name: name.to_string(),
            }),
            _ => Err(PipelineError::MalformedIdentifier(s.to_string())),
        }
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

/// One logical file and its physical copies
///
/// `rses` maps a storage endpoint (RSE) name to the access URLs of the copy
/// held there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalFile {
    pub scope: String,
    pub name: String,
    #[serde(default)]
    pub rses: BTreeMap<String, Vec<String>>,
}

impl LogicalFile {
    pub fn did(&self) -> Did {
        Did {
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }

    /// Classifies the physical copies of this file
    ///
    /// A copy at an endpoint listed in `local_rses` is the local location,
    /// with any `file://` prefix stripped. A copy whose URL is not a local
    /// file URL is a remote location. The first match of each kind, in
    /// endpoint-name order, wins.
    pub fn classify(&self, local_rses: &HashSet<String>) -> ReplicaLocation {
        let mut location = ReplicaLocation::default();

        for (rse, urls) in &self.rses {
            let Some(url) = urls.first() else {
                continue;
            };

            if location.local.is_none() && local_rses.contains(rse) {
                location.local = Some(LocalReplica {
                    rse: rse.clone(),
                    path: url.trim_start_matches(FILE_SCHEME).to_string(),
                });
            }
            if location.remote.is_none() && !url.starts_with(FILE_SCHEME) {
                location.remote = Some(RemoteReplica {
                    rse: rse.clone(),
                    url: url.clone(),
                });
            }
        }

        location
    }
}

/// A copy readable directly from the site's filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalReplica {
    pub rse: String,
    pub path: String,
}

/// A copy that must be fetched over the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteReplica {
    pub rse: String,
    pub url: String,
}

/// Classified locations of one logical file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub local: Option<LocalReplica>,
    pub remote: Option<RemoteReplica>,
}

impl ReplicaLocation {
    pub fn is_accessible(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }
}

/// Access protocol of a storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RseProtocol {
    pub scheme: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub prefix: String,
}

impl RseProtocol {
    /// Base URL `scheme://host:port/prefix` for files written to the endpoint
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.hostname, self.port, self.prefix
        )
    }
}
