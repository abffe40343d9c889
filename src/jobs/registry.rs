//! In-memory job registry

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{AnalysisJob, JobState};

/// Shared registry of analysis jobs
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, AnalysisJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job waiting for data
    pub async fn create(&self) -> AnalysisJob {
        let job = AnalysisJob::new();
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job.job_id, job.clone());
        }

        tracing::info!(job_id = %job.job_id, "Created analysis job");
        job
    }

    pub async fn get(&self, job_id: Uuid) -> Option<AnalysisJob> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).cloned()
    }

    /// Move a job to `state`; `detail` overrides the default description
    pub async fn set_state(
        &self,
        job_id: Uuid,
        state: JobState,
        detail: Option<String>,
    ) -> Option<AnalysisJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id)?;

        job.state = state;
        job.state_detail = detail.unwrap_or_else(|| state.detail().to_string());
        job.updated_at = Utc::now();

        tracing::debug!(job_id = %job_id, state = ?state, "Analysis job state changed");
        Some(job.clone())
    }
}
