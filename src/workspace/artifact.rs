// dbsnapshot/src/workspace/artifact.rs
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Owns one per-run file and deletes it when dropped.
///
/// Deletion is best effort: a file that is already gone is fine, any other
/// failure is logged and swallowed.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands the file over to the caller; it is no longer deleted on drop.
    pub fn release(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ArtifactGuard {
    // Runs on the calling thread: the file must be gone by the time the
    // owning scope returns.
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(file = %self.path.display(), "removed artifact"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "failed to remove artifact")
            }
        }
    }
}
