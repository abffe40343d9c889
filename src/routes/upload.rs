//! Upload Routes
//!
//! Endpoints:
//! - POST /upload - Raw body, name from headers or the configured default
//! - POST /upload/:name - Raw body, name from the path
//! - POST /upload/form - Multipart, first field carrying a file
//!
//! Headers are turned into an `UploadRequest` here; the receiver never sees
//! HTTP types.

use std::io;
use std::pin::Pin;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::{Stream, TryStreamExt};
use tokio_util::io::StreamReader;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{TransferMode, UploadReport, UploadRequest};

/// Header naming the destination file
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Header announcing that the body itself carries chunked framing
pub const TRANSFER_FRAMING_HEADER: &str = "x-transfer-framing";

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_raw))
        .route("/form", post(upload_form))
        .route("/:name", post(upload_named))
        .layer(DefaultBodyLimit::disable())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload
async fn upload_raw(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let name = file_name_from_headers(&headers)
        .unwrap_or_else(|| state.config().upload.default_file_name.clone());
    receive_body(&state, name, &headers, body).await
}

/// POST /upload/:name
async fn upload_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    receive_body(&state, name, &headers, body).await
}

/// POST /upload/form
///
/// Receives the first field that carries a file name; other fields are skipped.
async fn upload_form(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response> {
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            tracing::debug!(field = ?field.name(), "Skipping multipart field without a file");
            continue;
        };
        let content_type = field.content_type().map(|s| s.to_string());

        let request = UploadRequest::unbounded(&file_name)
            .expecting_zip(expects_zip(content_type.as_deref(), &file_name));

        let source = stream_reader(field.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)));
        let report = state.results().receive(request, source).await;
        return Ok(report_response(report));
    }

    tracing::warn!("No file field found in multipart upload");
    Err(AppError::BadRequest(
        "No file provided in multipart form".to_string(),
    ))
}

async fn receive_body(state: &AppState, name: String, headers: &HeaderMap, body: Body) -> Response {
    let request = upload_request(name, headers);
    // Body errors mean the connection broke mid-transfer
    let source = stream_reader(
        body.into_data_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e)),
    );

    let report = state.results().receive(request, source).await;
    report_response(report)
}

/// Map a report to its status code with the report as the JSON body
pub(crate) fn report_response(report: UploadReport) -> Response {
    (report.status_code(), Json(report)).into_response()
}

// ============================================================================
// Header Parsing
// ============================================================================

/// Adapt a byte stream to `AsyncRead`
pub(crate) fn stream_reader<S>(stream: S) -> StreamReader<Pin<Box<S>>, Bytes>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    StreamReader::new(Box::pin(stream))
}

/// Build receiver inputs from the request headers
pub(crate) fn upload_request(name: String, headers: &HeaderMap) -> UploadRequest {
    let content_type = header_str(headers, header::CONTENT_TYPE.as_str());
    let expect_zip = expects_zip(content_type, &name);

    // Content-Length of a framed body counts the framing, not the payload
    let request = match (transfer_mode(headers), content_length(headers)) {
        (TransferMode::Chunked, _) => UploadRequest::chunked(name),
        (TransferMode::FixedLength, Some(length)) => UploadRequest::fixed_length(name, length),
        _ => UploadRequest::unbounded(name),
    };

    request.expecting_zip(expect_zip)
}

/// Chunked when announced, fixed-length with a valid Content-Length, else
/// read until the body ends.
///
/// Wire-level `Transfer-Encoding: chunked` is removed by hyper before the
/// handler sees the body, so it arrives here as an unbounded stream.
pub(crate) fn transfer_mode(headers: &HeaderMap) -> TransferMode {
    let framed = header_str(headers, TRANSFER_FRAMING_HEADER)
        .map(|v| v.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    if framed {
        TransferMode::Chunked
    } else if content_length(headers).is_some() {
        TransferMode::FixedLength
    } else {
        TransferMode::Unbounded
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, header::CONTENT_LENGTH.as_str())?
        .trim()
        .parse()
        .ok()
}

/// ZIP validation applies when the type mentions zip or the name ends in .zip
pub(crate) fn expects_zip(content_type: Option<&str>, name: &str) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("zip"))
        .unwrap_or(false)
        || name.to_ascii_lowercase().ends_with(".zip")
}

/// `X-File-Name`, then the `Content-Disposition` file name
pub(crate) fn file_name_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(name) = header_str(headers, FILE_NAME_HEADER) {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    header_str(headers, header::CONTENT_DISPOSITION.as_str()).and_then(disposition_file_name)
}

/// Extract the file name from a Content-Disposition value.
///
/// `filename*=UTF-8''...` wins over `filename=`.
pub(crate) fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim().trim_matches('"');

        if key == "filename*" {
            let encoded = match raw.split_once("''") {
                Some((charset, rest)) if charset.eq_ignore_ascii_case("utf-8") => rest,
                Some(_) => continue,
                None => raw,
            };
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.trim().is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if key == "filename" && !raw.is_empty() && plain.is_none() {
            plain = Some(raw.to_string());
        }
    }

    plain
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
