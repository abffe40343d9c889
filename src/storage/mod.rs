//! Local content directories
//!
//! Every file the server reads or writes lives directly under a content root.
//! Writers stage into a hidden `.part` file and publish it with one rename.

mod content_dir;
mod naming;

pub use content_dir::{ContentDir, StoredObject};
pub(crate) use content_dir::StagingGuard;
pub use naming::sanitize_file_name;

/// Content directory errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File is empty: {0}")]
    Empty(String),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
