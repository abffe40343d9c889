//! Analysis job routes
//!
//! Endpoints:
//! - POST /v1/dataspace/analysisjob - Create a job
//! - GET /v1/dataspace/analysisjob/:id/status - Job state
//! - POST /v1/dataspace/analysisjob/:id/data - Upload job data, package result
//! - GET /v1/dataspace/analysisjob/:id/result - Download the result archive

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::archive::package_single;
use crate::error::{AppError, Result};
use crate::jobs::{AnalysisJob, JobResponse, JobState};
use crate::state::AppState;
use crate::upload::{UploadReport, UploadRequest};

use super::files::stored_response;
use super::upload::{report_response, stream_reader, upload_request};

/// Response to a data upload that was stored
#[derive(Debug, Serialize)]
pub struct DataResponse {
    #[serde(flatten)]
    pub job: JobResponse,
    pub upload: UploadReport,
}

/// Create the analysis job router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/:id/status", get(job_status))
        .route("/:id/data", post(upload_data))
        .route("/:id/data/file", post(upload_data))
        .route("/:id/result", get(job_result))
        .layer(DefaultBodyLimit::disable())
}

/// POST /v1/dataspace/analysisjob
///
/// The request body is not interpreted; a Content-Type other than JSON is
/// rejected.
async fn create_job(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let content_type = content_type.to_str().unwrap_or_default();
        if !content_type.to_ascii_lowercase().contains("application/json") {
            return Err(AppError::UnsupportedMediaType(format!(
                "Expected application/json, got {:?}",
                content_type
            )));
        }
    }

    let job = state.jobs().create().await;
    let location = format!("/v1/dataspace/analysisjob/{}/status", job.job_id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(JobResponse::from(&job)),
    )
        .into_response())
}

/// GET /v1/dataspace/analysisjob/:id/status
async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>> {
    let job = find_job(&state, &id).await?;
    Ok(Json(JobResponse::from(&job)))
}

/// POST /v1/dataspace/analysisjob/:id/data
///
/// Stores the body as `<id>.csv` in the data directory, then packages it into
/// `<id>.zip`.
async fn upload_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    let job = find_job(&state, &id).await?;

    let request = upload_request(job.data_file_name(), &headers).expecting_zip(false);
    let source = stream_reader(
        body.into_data_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e)),
    );

    receive_job_data(&state, &job, request, source).await
}

/// Store a job's data and package its result.
///
/// The job only leaves `WAITING_FOR_DATA` once the whole body is on disk, so a
/// request abandoned mid-transfer leaves it ready for another attempt.
async fn receive_job_data<R>(
    state: &AppState,
    job: &AnalysisJob,
    request: UploadRequest,
    source: R,
) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let jobs = state.jobs();
    let report = state.data().receive(request, source).await;

    if let Some(error) = report.failure() {
        jobs.set_state(job.job_id, JobState::Failed, Some(error.to_string()))
            .await;
        return Ok(report_response(report));
    }

    jobs.set_state(job.job_id, JobState::Processing, None).await;

    let dir = state.data().content_dir();
    if let Err(e) = package_single(dir, &job.data_file_name(), &job.result_file_name()).await {
        jobs.set_state(job.job_id, JobState::Failed, Some(e.to_string()))
            .await;
        return Err(e.into());
    }

    tracing::info!(
        job_id = %job.job_id,
        bytes_received = report.bytes_received,
        result = %job.result_file_name(),
        "Analysis job completed"
    );

    let job = jobs
        .set_state(job.job_id, JobState::Completed, None)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown job: {}", job.job_id)))?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            job: JobResponse::from(&job),
            upload: report,
        }),
    )
        .into_response())
}

/// GET /v1/dataspace/analysisjob/:id/result
///
/// Served from the data directory whether or not the job is still registered.
async fn job_result(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let job_id = parse_job_id(&id)?;
    let archive_name = format!("{}.zip", job_id);

    let object = state.data().content_dir().open(&archive_name).await?;
    stored_response(object, "application/zip")
}

fn parse_job_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound(format!("Unknown job: {}", id)))
}

async fn find_job(state: &AppState, id: &str) -> Result<AnalysisJob> {
    let job_id = parse_job_id(id)?;
    state
        .jobs()
        .get(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown job: {}", id)))
}
