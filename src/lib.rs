//! EDPS Mock Server
//!
//! Stands in for the EDPS analysis service and the Daseen publisher during
//! data-pipeline integration tests. Uploads are streamed to disk, committed
//! atomically and, when they claim to be ZIP archives, structurally validated.

pub mod archive;
pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::AppError;
pub use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .nest("/files", routes::files::data_router())
        .nest("/results", routes::files::results_router())
        .nest("/upload", routes::upload::router())
        .nest("/v1/dataspace/analysisjob", routes::analysisjob::router())
        .nest("/create-edp", routes::daseen::router())
        .route("/", post(routes::daseen::create_edp))
        .fallback(routes::files::serve_root_file)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
