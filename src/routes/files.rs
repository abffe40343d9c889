//! File serving routes
//!
//! Streams stored files from the data and results directories. Data files
//! are also served at the server root (`GET /data.zip`) for clients that
//! address the data directory directly.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Method, StatusCode, Uri},
    response::Response,
    routing::get,
    Router,
};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{ContentDir, StoredObject};

/// Router for `/files`, backed by the data directory
pub fn data_router() -> Router<AppState> {
    Router::new().route("/*path", get(serve_data_file))
}

/// Router for `/results`, backed by the results directory
pub fn results_router() -> Router<AppState> {
    Router::new().route("/*path", get(serve_result_file))
}

async fn serve_data_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    serve_from(state.data().content_dir(), &path).await
}

async fn serve_result_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    serve_from(state.results().content_dir(), &path).await
}

/// Fallback for any path no other route claims: a data file named by the path
pub async fn serve_root_file(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response> {
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::NotFound(format!("No route for {} {}", method, uri.path())));
    }

    let path = urlencoding::decode(uri.path())
        .map_err(|_| AppError::NotFound(uri.path().to_string()))?;
    serve_from(state.data().content_dir(), &path).await
}

async fn serve_from(dir: &ContentDir, path: &str) -> Result<Response> {
    let name = single_segment(path)?;
    let object = dir.open(name).await?;
    let content_type = guess_content_type(&object.name);
    stored_response(object, &content_type)
}

/// Stream a stored object without buffering it in memory
pub(crate) fn stored_response(object: StoredObject, content_type: &str) -> Result<Response> {
    tracing::debug!(file_name = %object.name, size = object.size, "Serving file");

    let body = Body::from_stream(ReaderStream::new(object.file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, object.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", object.name.replace('"', "")),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Content directories are flat; nested paths are never remapped to a file
fn single_segment(path: &str) -> Result<&str> {
    let name = path.trim_start_matches('/');
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(AppError::NotFound(format!("File not found: {}", path)));
    }
    Ok(name)
}

/// Guess content type from file extension
fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
