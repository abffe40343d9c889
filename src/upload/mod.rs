//! Streamed Upload Module
//!
//! Receives a request body into a content directory with:
//! - Bounded-memory draining for fixed-length, chunked and unbounded bodies
//! - Hidden staging files and a single atomic rename as the commit point
//! - Optional ZIP structural validation before the commit
//!
//! Flow:
//! 1. HTTP layer derives an `UploadRequest` from the request headers
//! 2. `UploadReceiver::receive` drains the body into a staging file
//! 3. Non-empty, complete payloads are validated (if ZIP) and renamed into place
//! 4. The caller maps the returned `UploadReport` to a response

pub mod chunked;
pub mod receiver;
pub mod types;

pub use chunked::{ChunkedDecoder, ChunkedError};
pub use receiver::UploadReceiver;
pub use types::*;
