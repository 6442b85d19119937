//! Pipeline error taxonomy
//!
//! Every fault a request or job can hit on its way through the pipeline maps
//! onto one of these variants. Services decide per variant whether the fault
//! is terminal for the item; none of them crosses an item boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::JobStatus;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A dataset identifier is not of the form `scope:name`
    #[error("{0:?} is not correctly formatted as scope:name")]
    MalformedIdentifier(String),

    /// The catalog does not know the dataset, or it holds no files
    #[error("no such dataset {0}")]
    DatasetNotFound(String),

    /// Any other catalog-level fault
    #[error("replica catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A file has neither a local nor a usable remote copy
    #[error("no usable locations for file {file} in dataset {dataset}")]
    NoAccessibleReplica { file: String, dataset: String },

    #[error("catalog metadata lookup failed for {file}: {reason}")]
    MetadataLookupFailed { file: String, reason: String },

    #[error("failed to render job: {0}")]
    TemplateRenderError(String),

    #[error("failed to persist job: {0}")]
    StoreInsertFailed(String),

    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job {0} not found")]
    JobNotFound(Uuid),
}

impl PipelineError {
    /// Errors raised while resolving data for a request
    ///
    /// These abort the expansion of the whole request.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedIdentifier(_)
                | Self::DatasetNotFound(_)
                | Self::CatalogUnavailable(_)
                | Self::NoAccessibleReplica { .. }
                | Self::MetadataLookupFailed { .. }
        )
    }
}
