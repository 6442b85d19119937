//! Scheduler Module
//!
//! Drives every pipeline component on its own interval.

pub mod poller;

pub use poller::{Cycle, CyclePoller};

use async_trait::async_trait;

use crate::service::{Dispatcher, Ingestor, LifecycleTracker};

#[async_trait]
impl Cycle for Ingestor {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn run_cycle(&self) -> anyhow::Result<usize> {
        Ingestor::run_cycle(self).await
    }
}

#[async_trait]
impl Cycle for Dispatcher {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn run_cycle(&self) -> anyhow::Result<usize> {
        Dispatcher::run_cycle(self).await
    }
}

#[async_trait]
impl Cycle for LifecycleTracker {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn run_cycle(&self) -> anyhow::Result<usize> {
        Ok(self.archive_batches().await?)
    }
}
