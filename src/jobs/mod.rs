//! Analysis job mock
//!
//! Tracks the jobs created through `/v1/dataspace/analysisjob` so the status
//! endpoint reflects what has actually happened to each job.

mod registry;
mod types;

pub use registry::JobRegistry;
pub use types::*;
