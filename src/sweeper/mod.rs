// dbsnapshot/src/sweeper/mod.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;

use crate::scheduler::PeriodicTask;
use crate::storage::{ObjectStore, StoredObject};

/// Deletes stored snapshots older than the retention period.
pub struct RetentionSweeper {
    store: Arc<dyn ObjectStore>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ObjectStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// One cleanup pass relative to `now`. Returns the number of deleted objects.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let till = now.checked_sub_signed(self.retention).with_context(|| {
            format!(
                "Retention of {} days reaches before the representable time range",
                self.retention.num_days()
            )
        })?;
        tracing::info!(before = %till.to_rfc3339_opts(SecondsFormat::Secs, true), "cleaning up storage");

        let objects = self
            .store
            .list_all()
            .await
            .context("Failed to list stored objects")?;

        let expired = select_expired(&objects, till);
        if expired.is_empty() {
            tracing::info!(listed = objects.len(), "no objects to delete");
            return Ok(0);
        }

        self.store
            .delete_batch(&expired)
            .await
            .with_context(|| format!("Failed to delete {} expired objects", expired.len()))?;

        tracing::info!(deleted = expired.len(), listed = objects.len(), "cleaned up storage");
        Ok(expired.len())
    }
}

#[async_trait]
impl PeriodicTask for RetentionSweeper {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run(&mut self) -> Result<()> {
        self.sweep(Utc::now()).await.map(|_| ())
    }
}

/// Keys of objects last modified strictly before `till`.
///
/// Objects without a modification time are never selected.
pub fn select_expired(objects: &[StoredObject], till: DateTime<Utc>) -> Vec<String> {
    objects
        .iter()
        .filter(|object| object.last_modified.is_some_and(|at| at < till))
        .map(|object| object.key.clone())
        .collect()
}
