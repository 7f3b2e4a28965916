// dbsnapshot/src/dump/mod.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use which::which;

use crate::errors::AppError;
use crate::workspace::ArtifactGuard;

/// Produces a raw database dump file inside a directory.
#[async_trait]
pub trait DumpProducer: Send + Sync {
    /// Writes a new dump into `dir` and returns its path.
    async fn dump(&self, dir: &Path) -> Result<PathBuf>;
}

/// Runs `pg_dump` against a PostgreSQL connection string.
pub struct PgDumper {
    program: Option<PathBuf>,
    database_url: String,
}

impl PgDumper {
    /// `pg_dump` is looked up on `PATH` at every run.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            program: None,
            database_url: database_url.into(),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>, database_url: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
            database_url: database_url.into(),
        }
    }

    fn program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => which("pg_dump").context(
                "pg_dump executable not found in PATH. Please ensure PostgreSQL client tools are installed.",
            ),
        }
    }
}

#[async_trait]
impl DumpProducer for PgDumper {
    async fn dump(&self, dir: &Path) -> Result<PathBuf> {
        let program = self.program()?;
        let file_path = dir.join(dump_file_name(Utc::now()));

        tracing::info!(file = %file_path.display(), "dumping database");
        // pg_dump may leave a partial file behind when it fails.
        let partial = ArtifactGuard::new(&file_path);

        let output = Command::new(&program)
            .arg(&self.database_url)
            .arg("-f")
            .arg(partial.path())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", program.display()))?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let combined = combined.trim();
        if !combined.is_empty() {
            tracing::info!(output = %combined, "dump output");
        }

        if !output.status.success() {
            return Err(AppError::Command {
                program: program.display().to_string(),
                status: output.status,
                output: combined.to_string(),
            }
            .into());
        }

        Ok(partial.release())
    }
}

/// `dump-<UTC RFC3339>.sql`, second precision.
pub fn dump_file_name(at: DateTime<Utc>) -> String {
    format!("dump-{}.sql", at.to_rfc3339_opts(SecondsFormat::Secs, true))
}
