// dbsnapshot/src/workspace/mod.rs
pub(crate) mod artifact;

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub use artifact::ArtifactGuard;

/// Well-known root under which each process creates its run directory.
pub const WORKSPACE_ROOT: &str = "./tmp";

/// The exclusively-owned directory holding in-flight artifacts.
///
/// The directory is also removed if the value is dropped without calling
/// [`Workspace::remove`], so an unwinding panic does not leave it behind.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Wipes `root` (stale state of a crashed run included), recreates it and
    /// creates a fresh owner-only run directory beneath it.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        match fs::remove_dir_all(root) {
            Ok(()) => tracing::debug!(root = %root.display(), "removed stale workspace root"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove stale workspace root {}", root.display())
                });
            }
        }

        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create workspace root {}", root.display()))?;

        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(root)
            .with_context(|| format!("Failed to create run directory in {}", root.display()))?;

        restrict_to_owner(dir.path())?;

        tracing::info!(dir = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Recursively deletes the run directory. Failures are logged, never returned.
    pub fn remove(self) {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::info!(dir = %path.display(), "workspace removed"),
            Err(e) => tracing::error!(dir = %path.display(), error = %e, "failed to remove workspace"),
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}
