//! Replica listing endpoint

use serde::Serialize;
use sluice_core::domain::replica::{Did, LogicalFile};

use crate::CatalogClient;
use crate::error::{ClientError, Result};

#[derive(Debug, Serialize)]
struct ListReplicasRequest<'a> {
    dids: [DidRef<'a>; 1],
}

#[derive(Debug, Serialize)]
struct DidRef<'a> {
    scope: &'a str,
    name: &'a str,
}

impl CatalogClient {
    /// List the replicas of every file in a dataset
    ///
    /// # Arguments
    /// * `did` - The dataset identifier
    ///
    /// # Returns
    /// One entry per logical file, in catalog listing order
    pub async fn list_replicas(&self, did: &Did) -> Result<Vec<LogicalFile>> {
        let url = format!("{}/replicas/list", self.base_url);
        let response = self
            .post(&url)
            .json(&ListReplicasRequest {
                dids: [DidRef {
                    scope: &did.scope,
                    name: &did.name,
                }],
            })
            .send()
            .await?;

        let body = self.handle_text(response, &did.to_string()).await?;
        let files = parse_replica_stream(&body)?;

        tracing::debug!("Catalog listed {} file(s) for {}", files.len(), did);

        Ok(files)
    }
}

/// Parses the newline-delimited JSON stream returned by the replica listing
pub(crate) fn parse_replica_stream(body: &str) -> Result<Vec<LogicalFile>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<LogicalFile>(line)
                .map_err(|e| ClientError::ParseError(format!("Invalid replica entry: {}", e)))
        })
        .collect()
}
