//! ZIP archive handling
//!
//! - `validator`: structural integrity check of a file claimed to be a ZIP
//! - `packager`: wraps a stored file into a single-entry ZIP

pub mod packager;
pub mod validator;

pub use packager::{package_single, PackageError};
pub use validator::{validate_zip, validate_zip_blocking, ZipValidation};
