//! Component poller
//!
//! Runs one component cycle per tick. A failed cycle is logged and the next
//! tick starts from scratch.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// One pass of a pipeline component
#[async_trait]
pub trait Cycle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the number of items handled
    async fn run_cycle(&self) -> anyhow::Result<usize>;
}

pub struct CyclePoller {
    cycle: Arc<dyn Cycle>,
    interval: Duration,
}

impl CyclePoller {
    pub fn new(cycle: Arc<dyn Cycle>, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!(
            "Starting {} loop (interval: {:?})",
            self.cycle.name(),
            self.interval
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }

    /// Performs a single cycle, logging its outcome
    pub async fn run_once(&self) -> Option<usize> {
        match self.cycle.run_cycle().await {
            Ok(handled) => {
                if handled > 0 {
                    info!("{}: handled {} item(s) this cycle", self.cycle.name(), handled);
                } else {
                    debug!("{}: nothing to do", self.cycle.name());
                }
                Some(handled)
            }
            Err(e) => {
                error!("Error during {} cycle: {:#}", self.cycle.name(), e);
                None
            }
        }
    }
}
