//! Analysis job types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state reported to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created, no data uploaded yet
    WaitingForData,
    /// Data received, result being packaged
    Processing,
    /// Result archive available
    Completed,
    /// Data upload or packaging failed
    Failed,
}

impl JobState {
    /// Default human-readable detail for a state
    pub fn detail(&self) -> &'static str {
        match self {
            JobState::WaitingForData => "Job is waiting for data to be uploaded.",
            JobState::Processing => "Job data received, analysis in progress.",
            JobState::Completed => "Job has finished, result is available.",
            JobState::Failed => "Job failed.",
        }
    }
}

/// A mock analysis job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: Uuid,
    pub state: JobState,
    pub state_detail: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::WaitingForData,
            state_detail: JobState::WaitingForData.detail().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// File name the job's uploaded data is stored under
    pub fn data_file_name(&self) -> String {
        format!("{}.csv", self.job_id)
    }

    /// File name of the packaged result archive
    pub fn result_file_name(&self) -> String {
        format!("{}.zip", self.job_id)
    }
}

impl Default for AnalysisJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire shape of job responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub state_detail: String,
}

impl From<&AnalysisJob> for JobResponse {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            job_id: job.job_id,
            state: job.state,
            state_detail: job.state_detail.clone(),
        }
    }
}
