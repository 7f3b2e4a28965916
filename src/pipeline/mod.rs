// dbsnapshot/src/pipeline/mod.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::compress::Compressor;
use crate::dump::DumpProducer;
use crate::scheduler::PeriodicTask;
use crate::storage::{ObjectStore, object_key_from_path};
use crate::workspace::ArtifactGuard;

/// One dump → compress → upload cycle.
///
/// Every local file the run produces is owned by an [`ArtifactGuard`], so
/// both the raw and the compressed dump are gone when the run returns,
/// whichever step failed.
pub struct SnapshotPipeline {
    workdir: PathBuf,
    dumper: Arc<dyn DumpProducer>,
    compressor: Arc<dyn Compressor>,
    store: Arc<dyn ObjectStore>,
}

impl SnapshotPipeline {
    pub fn new(
        workdir: impl Into<PathBuf>,
        dumper: Arc<dyn DumpProducer>,
        compressor: Arc<dyn Compressor>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            dumper,
            compressor,
            store,
        }
    }

    /// Runs the pipeline once and returns the key of the uploaded object.
    pub async fn run_once(&self) -> Result<String> {
        tracing::info!("creating database snapshot");

        let raw = ArtifactGuard::new(
            self.dumper
                .dump(&self.workdir)
                .await
                .context("Failed to dump database")?,
        );

        let compressed = ArtifactGuard::new(
            self.compressor
                .compress(raw.path())
                .await
                .context("Failed to compress dump")?,
        );

        let key = object_key_from_path(compressed.path()).with_context(|| {
            format!("Compressed dump has no usable file name: {}", compressed.path().display())
        })?;

        self.store
            .upload(compressed.path(), &key)
            .await
            .context("Failed to upload snapshot")?;

        tracing::info!(key = %key, "created database snapshot");
        Ok(key)
    }
}

#[async_trait]
impl PeriodicTask for SnapshotPipeline {
    fn name(&self) -> &'static str {
        "dump"
    }

    async fn run(&mut self) -> Result<()> {
        self.run_once().await.map(|_| ())
    }
}
