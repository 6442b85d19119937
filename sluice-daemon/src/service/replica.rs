//! Replica resolution
//!
//! Turns dataset identifiers into per-file locations using the replica
//! catalog, and maps catalog faults onto the pipeline error taxonomy.

use serde_json::{Map, Value};
use sluice_catalog::{ClientError, ReplicaCatalog};
use sluice_core::domain::replica::{Did, LogicalFile, ReplicaLocation};
use sluice_core::domain::variant::PileupInput;
use sluice_core::{PipelineError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// A main input file and where it can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub did: Did,
    pub location: ReplicaLocation,
}

pub struct ReplicaResolver {
    catalog: Arc<dyn ReplicaCatalog>,
    local_rses: HashSet<String>,
}

impl ReplicaResolver {
    pub fn new(catalog: Arc<dyn ReplicaCatalog>, local_rses: HashSet<String>) -> Self {
        Self {
            catalog,
            local_rses,
        }
    }

    /// Resolves every file of a dataset to a local and/or remote location
    ///
    /// Fails as a whole if any file has neither.
    pub async fn resolve(&self, dataset: &str) -> Result<Vec<ResolvedFile>> {
        let files = self.list(dataset).await?;

        files
            .into_iter()
            .map(|file| {
                let location = file.classify(&self.local_rses);
                if !location.is_accessible() {
                    return Err(PipelineError::NoAccessibleReplica {
                        file: file.did().to_string(),
                        dataset: dataset.to_string(),
                    });
                }
                Ok(ResolvedFile {
                    did: file.did(),
                    location,
                })
            })
            .collect()
    }

    /// Resolves the files of a pileup dataset to remote URLs
    ///
    /// Pileup is always fetched by the backend so it can be cached.
    pub async fn resolve_pileup(&self, dataset: &str) -> Result<Vec<PileupInput>> {
        let files = self.list(dataset).await?;

        files
            .into_iter()
            .map(|file| match file.classify(&self.local_rses).remote {
                Some(remote) => Ok(PileupInput::new(remote.url, &file.name)),
                None => Err(PipelineError::NoAccessibleReplica {
                    file: file.did().to_string(),
                    dataset: dataset.to_string(),
                }),
            })
            .collect()
    }

    pub async fn metadata(&self, file: &Did) -> Result<Map<String, Value>> {
        self.catalog
            .get_metadata(file)
            .await
            .map_err(|e| PipelineError::MetadataLookupFailed {
                file: file.to_string(),
                reason: e.to_string(),
            })
    }

    /// Base URL outputs written to `rse` end up under
    pub async fn output_base(&self, rse: &str) -> Result<String> {
        let protocols = self
            .catalog
            .get_protocols(rse)
            .await
            .map_err(|e| PipelineError::CatalogUnavailable(format!("protocols of {rse}: {e}")))?;

        protocols
            .first()
            .map(|protocol| protocol.base_url())
            .ok_or_else(|| PipelineError::CatalogUnavailable(format!("{rse} has no protocols")))
    }

    async fn list(&self, dataset: &str) -> Result<Vec<LogicalFile>> {
        let did: Did = dataset.parse()?;

        let files = self
            .catalog
            .list_replicas(&did)
            .await
            .map_err(|e| catalog_error(dataset, e))?;

        if files.is_empty() {
            return Err(PipelineError::DatasetNotFound(dataset.to_string()));
        }

        tracing::debug!("Dataset {} lists {} file(s)", dataset, files.len());

        Ok(files)
    }
}

fn catalog_error(dataset: &str, err: ClientError) -> PipelineError {
    if err.is_not_found() {
        PipelineError::DatasetNotFound(dataset.to_string())
    } else {
        PipelineError::CatalogUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticCatalog, logical_file};
    use sluice_core::domain::replica::RseProtocol;

    fn local_rses() -> HashSet<String> {
        HashSet::from(["SLAC_POSIX".to_string()])
    }

    fn resolver(catalog: StaticCatalog) -> ReplicaResolver {
        ReplicaResolver::new(Arc::new(catalog), local_rses())
    }

    #[tokio::test]
    async fn test_remote_only_file() {
        let catalog = StaticCatalog::default().with_dataset(
            "mc:sample",
            vec![logical_file("mc:a.root", &[("SLAC_GRIDFTP", "gsiftp://slac/a.root")])],
        );

        let files = resolver(catalog).resolve("mc:sample").await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].location.local.is_none());
        assert_eq!(
            files[0].location.remote.as_ref().unwrap().url,
            "gsiftp://slac/a.root"
        );
    }

    #[tokio::test]
    async fn test_local_only_file() {
        let catalog = StaticCatalog::default().with_dataset(
            "mc:sample",
            vec![logical_file("mc:a.root", &[("SLAC_POSIX", "file:///nfs/a.root")])],
        );

        let files = resolver(catalog).resolve("mc:sample").await.unwrap();
        let local = files[0].location.local.as_ref().unwrap();
        assert_eq!(local.path, "/nfs/a.root");
        assert_eq!(local.rse, "SLAC_POSIX");
        assert!(files[0].location.remote.is_none());
    }

    #[tokio::test]
    async fn test_inaccessible_file_fails_dataset() {
        let catalog = StaticCatalog::default().with_dataset(
            "mc:sample",
            vec![
                logical_file("mc:a.root", &[("SLAC_GRIDFTP", "gsiftp://slac/a.root")]),
                logical_file("mc:b.root", &[("OTHER_POSIX", "file:///elsewhere/b.root")]),
            ],
        );

        let err = resolver(catalog).resolve("mc:sample").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoAccessibleReplica { ref file, .. } if file == "mc:b.root"
        ));
    }

    #[tokio::test]
    async fn test_dataset_errors() {
        let resolver = resolver(StaticCatalog::default().with_dataset("mc:empty", vec![]));

        assert!(matches!(
            resolver.resolve("mc:missing").await,
            Err(PipelineError::DatasetNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("mc:empty").await,
            Err(PipelineError::DatasetNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("no-scope").await,
            Err(PipelineError::MalformedIdentifier(_))
        ));

        let down = ReplicaResolver::new(
            Arc::new(StaticCatalog::default().unavailable()),
            local_rses(),
        );
        assert!(matches!(
            down.resolve("mc:sample").await,
            Err(PipelineError::CatalogUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_pileup_needs_remote_copy() {
        let catalog = StaticCatalog::default()
            .with_dataset(
                "mc:pileup",
                vec![logical_file("mc:pu1.root", &[("SLAC_GRIDFTP", "root://slac/pu1.root")])],
            )
            .with_dataset(
                "mc:local-pileup",
                vec![logical_file("mc:pu2.root", &[("SLAC_POSIX", "file:///nfs/pu2.root")])],
            );
        let resolver = resolver(catalog);

        let pileup = resolver.resolve_pileup("mc:pileup").await.unwrap();
        assert_eq!(pileup[0].url, "root://slac/pu1.root");
        assert_eq!(pileup[0].local_name, "./pu1.root");

        assert!(matches!(
            resolver.resolve_pileup("mc:local-pileup").await,
            Err(PipelineError::NoAccessibleReplica { .. })
        ));
    }

    #[tokio::test]
    async fn test_output_base() {
        let catalog = StaticCatalog::default().with_protocol(
            "SLAC_GRIDFTP",
            RseProtocol {
                scheme: "gsiftp".to_string(),
                hostname: "slac.example".to_string(),
                port: 2811,
                prefix: "/ldmx/prod".to_string(),
            },
        );
        let resolver = resolver(catalog);

        assert_eq!(
            resolver.output_base("SLAC_GRIDFTP").await.unwrap(),
            "gsiftp://slac.example:2811/ldmx/prod"
        );
        assert!(matches!(
            resolver.output_base("NOWHERE").await,
            Err(PipelineError::CatalogUnavailable(_))
        ));
    }
}
