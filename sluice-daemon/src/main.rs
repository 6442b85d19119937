//! Sluice
//!
//! Turns simulation production requests into tracked grid jobs.
//!
//! Architecture:
//! - Configuration: deployment settings from the environment, site settings
//!   from the sites file re-read every cycle
//! - Services: ingest (resolve, expand, render, stage, persist), dispatch
//!   (describe and hand to the backend) and lifecycle (status, archive)
//! - Scheduler: one polling loop per component
//! - API: status reports and batch progress over HTTP

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sluice_catalog::{CatalogClient, ReplicaCatalog};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::backend::{ExecutionBackend, queue::QueueBackend};
use crate::config::Config;
use crate::repository::{JobStore, PgJobStore};
use crate::scheduler::{Cycle, CyclePoller};
use crate::service::{Dispatcher, Ingestor, LifecycleTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Component {
    Ingest,
    Dispatch,
    Archive,
    Api,
}

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Simulation production job pipeline", long_about = None)]
struct Cli {
    /// Components to run; all of them when omitted
    #[arg(long = "component", value_enum)]
    components: Vec<Component>,

    /// Run each selected loop once and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn runs(&self, component: Component) -> bool {
        self.components.is_empty() || self.components.contains(&component)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sluice");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let backend: Arc<dyn ExecutionBackend> = Arc::new(QueueBackend::new(pool));

    let mut catalog = CatalogClient::new(config.catalog_url.clone());
    if let Some(token) = &config.catalog_token {
        catalog = catalog.with_token(token.clone());
    }
    let catalog: Arc<dyn ReplicaCatalog> = Arc::new(catalog);

    let ingestor = Arc::new(Ingestor::new(&config, store.clone(), catalog));
    let dispatcher = Arc::new(Dispatcher::new(&config, store.clone(), backend));
    let tracker = Arc::new(LifecycleTracker::new(store));

    let mut loops: Vec<CyclePoller> = Vec::new();
    if cli.runs(Component::Ingest) {
        loops.push(CyclePoller::new(ingestor, config.ingest_interval));
    }
    if cli.runs(Component::Dispatch) {
        loops.push(CyclePoller::new(
            dispatcher.clone() as Arc<dyn Cycle>,
            config.dispatch_interval,
        ));
    }
    if cli.runs(Component::Archive) {
        loops.push(CyclePoller::new(
            tracker.clone() as Arc<dyn Cycle>,
            config.archive_interval,
        ));
    }

    if cli.once {
        for poller in &loops {
            poller.run_once().await;
        }
        return Ok(());
    }

    for poller in loops {
        tokio::spawn(async move { poller.run().await });
    }

    if cli.runs(Component::Api) {
        let app = api::create_router(AppState {
            dispatcher,
            tracker,
        });

        info!("Listening on {}", config.bind_addr);
        let listener = tokio::net::TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        }
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutting down");
    }

    Ok(())
}
