//! Content directory: staging, atomic commit and read-side lookup

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use super::{sanitize_file_name, StorageError};

/// Longest slice of the destination name carried into a staging file name
const STAGING_NAME_MAX: usize = 128;

/// A flat directory of named files
#[derive(Debug, Clone)]
pub struct ContentDir {
    root: PathBuf,
}

/// An opened, non-empty file ready to be streamed to a client
#[derive(Debug)]
pub struct StoredObject {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub file: fs::File,
}

impl ContentDir {
    /// Wrap an existing directory without touching the filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory (and parents) if needed
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Final location of an already sanitized name
    pub fn final_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// A fresh, unique staging location for `name`.
    ///
    /// Staging files start with a dot, which sanitized final names never do.
    pub fn staging_path(&self, name: &str) -> PathBuf {
        let mut prefix = name;
        if prefix.len() > STAGING_NAME_MAX {
            let mut end = STAGING_NAME_MAX;
            while !prefix.is_char_boundary(end) {
                end -= 1;
            }
            prefix = &prefix[..end];
        }
        self.root
            .join(format!(".{}.{}.part", prefix, Uuid::new_v4().simple()))
    }

    /// Publish a fully written staging file under `name`.
    ///
    /// A single rename replaces any previous file, so readers observe either
    /// the old or the new content.
    pub async fn commit(&self, staging: &Path, name: &str) -> Result<PathBuf, StorageError> {
        let target = self.final_path(name);
        fs::rename(staging, &target).await?;

        // Persist the rename itself; failure here does not undo the commit
        #[cfg(unix)]
        {
            if let Ok(dir) = fs::File::open(&self.root).await {
                let _ = dir.sync_all().await;
            }
        }

        Ok(target)
    }

    /// Open a stored file for reading.
    ///
    /// Missing files are `NotFound` and zero-length files are `Empty`; no
    /// placeholder content is ever produced.
    pub async fn open(&self, raw_name: &str) -> Result<StoredObject, StorageError> {
        let name = sanitize_file_name(raw_name)?;
        let path = self.final_path(&name);

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(name));
        }
        if metadata.len() == 0 {
            return Err(StorageError::Empty(name));
        }

        Ok(StoredObject {
            name,
            path,
            size: metadata.len(),
            file,
        })
    }
}

/// Removes its staging file on drop unless the file was committed.
///
/// A request future dropped mid-upload (client gone) still cleans up.
#[derive(Debug)]
pub(crate) struct StagingGuard {
    path: PathBuf,
    armed: bool,
}

impl StagingGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// The staging file was renamed away; nothing left to clean up
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove the staging file now
    pub(crate) async fn discard(mut self) {
        self.armed = false;
        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
