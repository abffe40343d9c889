//! Result packaging
//!
//! Wraps a stored file into a single-entry ZIP next to it. The archive is
//! written to a staging path and committed with the same rename as uploads.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::{ContentDir, StagingGuard, StorageError};

/// Packaging errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("ZIP write error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Commit failed: {0}")]
    Commit(#[from] StorageError),

    #[error("Packaging task failed: {0}")]
    Task(String),
}

/// Package `source_name` into `archive_name`, both under `dir`.
///
/// Returns the final archive path. Both names must already be sanitized.
pub async fn package_single(
    dir: &ContentDir,
    source_name: &str,
    archive_name: &str,
) -> Result<PathBuf, PackageError> {
    let source = dir.final_path(source_name);
    if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
        return Err(PackageError::SourceMissing(source_name.to_string()));
    }

    let mut guard = StagingGuard::new(dir.staging_path(archive_name));
    let staging = guard.path().to_path_buf();
    let entry_name = source_name.to_string();

    let written = tokio::task::spawn_blocking(move || write_archive(&source, &staging, &entry_name))
        .await
        .map_err(|e| PackageError::Task(e.to_string()))?;

    if let Err(e) = written {
        guard.discard().await;
        return Err(e);
    }

    let target = dir.commit(guard.path(), archive_name).await?;
    guard.disarm();

    tracing::info!(
        source = %source_name,
        archive = %archive_name,
        "Packaged file into archive"
    );

    Ok(target)
}

fn write_archive(source: &Path, staging: &Path, entry_name: &str) -> Result<(), PackageError> {
    let mut input = BufReader::new(File::open(source)?);
    let output = File::create(staging)?;

    let mut writer = ZipWriter::new(BufWriter::new(output));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(entry_name, options)?;
    io::copy(&mut input, &mut writer)?;

    let buffered = writer.finish()?;
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
