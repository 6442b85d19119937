//! Service Module
//!
//! Pipeline components. Each one owns a single concern and talks to the
//! others only through the store.

pub mod description;
pub mod dispatch;
pub mod expander;
pub mod ingest;
pub mod lifecycle;
pub mod replica;

pub use dispatch::Dispatcher;
pub use ingest::Ingestor;
pub use lifecycle::LifecycleTracker;

use sluice_core::PipelineError;

use crate::repository::StoreError;

fn store_error(err: StoreError) -> PipelineError {
    PipelineError::StoreInsertFailed(err.to_string())
}
