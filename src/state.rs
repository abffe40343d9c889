//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobRegistry;
use crate::storage::{ContentDir, StorageError};
use crate::upload::UploadReceiver;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    data: UploadReceiver,
    results: UploadReceiver,
    jobs: JobRegistry,
}

impl AppState {
    /// Create the state, making sure both content roots exist
    pub async fn new(config: Config) -> Result<Self, StorageError> {
        let data_dir = ContentDir::create(&config.storage.data_dir).await?;
        let results_dir = ContentDir::create(&config.storage.results_dir).await?;
        let chunk_size = config.upload.chunk_size;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                data: UploadReceiver::new(data_dir).with_chunk_size(chunk_size),
                results: UploadReceiver::new(results_dir).with_chunk_size(chunk_size),
                jobs: JobRegistry::new(),
                config,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Receiver writing into the data directory
    pub fn data(&self) -> &UploadReceiver {
        &self.inner.data
    }

    /// Receiver writing into the results directory
    pub fn results(&self) -> &UploadReceiver {
        &self.inner.results
    }

    /// Get the analysis job registry
    pub fn jobs(&self) -> &JobRegistry {
        &self.inner.jobs
    }
}
