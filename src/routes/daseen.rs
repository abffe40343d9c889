//! Daseen publish mock

use axum::{body::Body, extract::DefaultBodyLimit, routing::post, Json, Router};
use futures::StreamExt;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub state: &'static str,
    pub state_detail: &'static str,
}

/// Router for `/create-edp`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_edp))
        .route("/*rest", post(create_edp))
        .layer(DefaultBodyLimit::disable())
}

/// POST /create-edp, also mounted at `POST /`
///
/// Drains the body without storing it and always reports success.
pub async fn create_edp(body: Body) -> Json<PublishResponse> {
    let mut stream = body.into_data_stream();
    let mut bytes_received: u64 = 0;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => bytes_received += chunk.len() as u64,
            Err(e) => {
                tracing::warn!(bytes_received, error = %e, "Publish body ended early");
                break;
            }
        }
    }

    tracing::info!(bytes_received, "EDP publish request accepted");
    Json(PublishResponse {
        state: "SUCCESS",
        state_detail: "EDPS data published to Daseen",
    })
}
