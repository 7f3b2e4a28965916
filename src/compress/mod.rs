// dbsnapshot/src/compress/mod.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

pub const COMPRESSED_SUFFIX: &str = ".gzip";

/// Turns one file into a compressed sibling.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Returns the path of the compressed file. The source is left untouched.
    async fn compress(&self, source: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor {
    level: Compression,
}

#[async_trait]
impl Compressor for GzipCompressor {
    async fn compress(&self, source: &Path) -> Result<PathBuf> {
        let source = source.to_path_buf();
        let level = self.level;
        tokio::task::spawn_blocking(move || gzip_file(&source, level))
            .await
            .context("Compression task panicked")?
    }
}

/// `<path>.gzip`
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

fn gzip_file(source: &Path, level: Compression) -> Result<PathBuf> {
    let input = File::open(source)
        .with_context(|| format!("Failed to open file for compression: {}", source.display()))?;
    let target = compressed_path(source);
    let output = File::create(&target)
        .with_context(|| format!("Failed to create compressed file: {}", target.display()))?;

    if let Err(e) = encode(input, output, level) {
        if let Err(remove_err) = fs::remove_file(&target) {
            tracing::warn!(file = %target.display(), error = %remove_err, "failed to remove partial archive");
        }
        return Err(e.context(format!("Failed to compress {}", source.display())));
    }

    tracing::debug!(source = %source.display(), target = %target.display(), "compressed dump");
    Ok(target)
}

fn encode(input: File, output: File, level: Compression) -> Result<()> {
    let mut encoder = GzEncoder::new(output, level);
    io::copy(&mut BufReader::new(input), &mut encoder).context("Failed to stream into encoder")?;
    encoder
        .finish()
        .context("Failed to finish Gzip encoding")?
        .sync_all()
        .context("Failed to flush compressed file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn writes_gzip_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dump-2024-01-01T00:00:00Z.sql");
        let contents = "CREATE TABLE t (id int);\n".repeat(200);
        std::fs::write(&source, &contents).unwrap();

        let target = GzipCompressor::default().compress(&source).await.unwrap();

        assert_eq!(target, dir.path().join("dump-2024-01-01T00:00:00Z.sql.gzip"));
        assert!(source.exists());
        let mut decoded = String::new();
        GzDecoder::new(File::open(&target).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, contents);
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = GzipCompressor::default()
            .compress(&dir.path().join("absent.sql"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unwritable_target_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dump.sql");
        std::fs::write(&source, b"data").unwrap();
        // A directory in the way makes File::create fail.
        std::fs::create_dir(compressed_path(&source)).unwrap();

        let result = GzipCompressor::default().compress(&source).await;

        assert!(result.is_err());
    }
}
