//! Scheduled database snapshots
//!
//! Dumps a PostgreSQL database on a fixed interval, compresses the dump,
//! uploads it to S3 and periodically deletes snapshots past their retention.

// dbsnapshot/src/main.rs
mod breaker;
mod compress;
mod config;
mod dump;
mod errors;
mod pipeline;
mod scheduler;
mod storage;
mod sweeper;
mod workspace;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use compress::GzipCompressor;
use config::AppConfig;
use dump::PgDumper;
use pipeline::SnapshotPipeline;
use scheduler::{Scheduler, StopReason};
use storage::{ObjectStore, S3Gateway};
use sweeper::RetentionSweeper;
use workspace::{WORKSPACE_ROOT, Workspace};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run_app().await {
        Ok(StopReason::Shutdown) => {
            tracing::info!("scheduler stopped, exiting");
            ExitCode::SUCCESS
        }
        Ok(StopReason::FailureThreshold { task }) => {
            tracing::error!(task, "scheduler stopped after repeated failures, exiting");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_app() -> Result<StopReason> {
    let config = AppConfig::from_env().context("Failed to load config")?;
    tracing::info!(
        database = %config.redacted_database_url(),
        bucket = %config.storage.bucket_name,
        retention_days = config.retention_days,
        "configuration loaded"
    );

    let workspace = Workspace::create(WORKSPACE_ROOT).context("Failed to create workspace")?;
    let outcome = run_scheduled(&config, workspace.path()).await;
    workspace.remove();
    outcome
}

async fn run_scheduled(config: &AppConfig, workdir: &Path) -> Result<StopReason> {
    let mut gateway = S3Gateway::new(config.storage.clone());
    gateway.init().await.context("Failed to init object storage")?;
    let store: Arc<dyn ObjectStore> = Arc::new(gateway);

    let dumper = match &config.pg_dump_path {
        Some(program) => PgDumper::with_program(program, config.database_url.clone()),
        None => PgDumper::new(config.database_url.clone()),
    };

    let mut scheduler = Scheduler::new();
    scheduler.every(
        config.dump_interval,
        SnapshotPipeline::new(
            workdir,
            Arc::new(dumper),
            Arc::new(GzipCompressor::default()),
            store.clone(),
        ),
    );
    scheduler.every(
        config.cleanup_interval,
        RetentionSweeper::new(store, config.retention()),
    );

    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) if !stop.is_stopped() => {
                tracing::info!("interrupt received, waiting for running tasks");
                stop.stop(StopReason::Shutdown);
            }
            Ok(()) => {}
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    tracing::info!("scheduler started");
    Ok(scheduler.run().await)
}
