//! Upload types

use serde::{Deserialize, Serialize, Serializer};

use crate::archive::ZipValidation;

// ============================================================================
// Constants
// ============================================================================

/// Default read buffer: 8KB
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Longest accepted chunk-size line in chunked framing
pub const MAX_CHUNK_LINE: usize = 1024;

// ============================================================================
// Request Types
// ============================================================================

/// How the end of the payload is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// Exactly `declared_length` bytes
    FixedLength,
    /// `<hex-length>\r\n<payload>\r\n` frames ending with a zero-length frame
    Chunked,
    /// Everything until the source reports end-of-stream
    Unbounded,
}

/// Transfer metadata supplied by the HTTP layer
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Caller-supplied name; sanitized before use
    pub destination_name: String,

    pub transfer_mode: TransferMode,

    pub declared_length: Option<u64>,

    /// Run ZIP structural validation before committing
    pub expect_zip: bool,
}

impl UploadRequest {
    pub fn fixed_length(destination_name: impl Into<String>, length: u64) -> Self {
        Self {
            destination_name: destination_name.into(),
            transfer_mode: TransferMode::FixedLength,
            declared_length: Some(length),
            expect_zip: false,
        }
    }

    pub fn chunked(destination_name: impl Into<String>) -> Self {
        Self {
            destination_name: destination_name.into(),
            transfer_mode: TransferMode::Chunked,
            declared_length: None,
            expect_zip: false,
        }
    }

    pub fn unbounded(destination_name: impl Into<String>) -> Self {
        Self {
            destination_name: destination_name.into(),
            transfer_mode: TransferMode::Unbounded,
            declared_length: None,
            expect_zip: false,
        }
    }

    pub fn with_declared_length(mut self, length: Option<u64>) -> Self {
        self.declared_length = length;
        self
    }

    pub fn expecting_zip(mut self, expect_zip: bool) -> Self {
        self.expect_zip = expect_zip;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// What a stored file is known to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Arbitrary bytes (including ZIPs that failed validation)
    Opaque,
    /// A ZIP archive that passed structural validation
    Zip,
}

/// A committed artifact under a content directory
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub kind: ContentKind,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
}

/// Outcome of a single upload; produced for every call, success or not
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Sanitized destination name, or the raw name when it was rejected
    pub destination: String,

    pub transfer_mode: TransferMode,

    pub bytes_received: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_length: Option<u64>,

    /// True when no length was declared
    pub matched_declared_length: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_validation: Option<ZipValidation>,

    pub committed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<StoredFile>,

    /// Failure cause, or a warning when `committed` is true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UploadError>,
}

impl UploadReport {
    /// Committed without any warning
    pub fn is_clean(&self) -> bool {
        self.committed && self.error.is_none()
    }

    /// The warning attached to a committed upload (corrupt or non-ZIP payload)
    pub fn warning(&self) -> Option<&UploadError> {
        if self.committed {
            self.error.as_ref()
        } else {
            None
        }
    }

    /// The reason an upload was not committed
    pub fn failure(&self) -> Option<&UploadError> {
        if self.committed {
            None
        } else {
            self.error.as_ref()
        }
    }

    /// HTTP status for this outcome
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self.failure() {
            None => axum::http::StatusCode::CREATED,
            Some(error) => error.status_code(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error kinds. Never escapes `UploadReceiver::receive` as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Stream ended early after {received} bytes")]
    TruncatedStream { received: u64, expected: Option<u64> },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Corrupt ZIP entry {entry}: {reason}")]
    ZipCorrupt { entry: String, reason: String },

    #[error("Not a ZIP archive: {0}")]
    ZipNotAnArchive(String),

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
}

impl UploadError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::TruncatedStream { .. } => "TRUNCATED_STREAM",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::ZipCorrupt { .. } => "ZIP_CORRUPT",
            Self::ZipNotAnArchive(_) => "ZIP_NOT_AN_ARCHIVE",
            Self::EmptyPayload => "EMPTY_PAYLOAD",
            Self::InvalidName(_) => "INVALID_NAME",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::TruncatedStream { .. } => StatusCode::BAD_REQUEST,
            Self::ProtocolError(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ZipCorrupt { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ZipNotAnArchive(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EmptyPayload => StatusCode::BAD_REQUEST,
            Self::InvalidName(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Warning derived from a failed ZIP validation, if any
    pub fn from_validation(validation: &ZipValidation) -> Option<Self> {
        match validation {
            ZipValidation::Valid { .. } => None,
            ZipValidation::Corrupt { entry, reason, .. } => Some(Self::ZipCorrupt {
                entry: entry.clone(),
                reason: reason.clone(),
            }),
            ZipValidation::NotAZip { reason } => Some(Self::ZipNotAnArchive(reason.clone())),
        }
    }
}

impl Serialize for UploadError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            message: String,
        }

        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(committed: bool, error: Option<UploadError>) -> UploadReport {
        UploadReport {
            destination: "a.zip".into(),
            transfer_mode: TransferMode::FixedLength,
            bytes_received: 3,
            declared_length: Some(3),
            matched_declared_length: true,
            zip_validation: None,
            committed,
            stored: None,
            error,
        }
    }

    #[test]
    fn test_warning_versus_failure() {
        let warned = report(true, Some(UploadError::ZipNotAnArchive("empty".into())));
        assert!(warned.warning().is_some());
        assert!(warned.failure().is_none());
        assert!(!warned.is_clean());
        assert_eq!(warned.status_code(), axum::http::StatusCode::CREATED);

        let failed = report(false, Some(UploadError::EmptyPayload));
        assert!(failed.warning().is_none());
        assert_eq!(failed.failure(), Some(&UploadError::EmptyPayload));
        assert_eq!(failed.status_code(), axum::http::StatusCode::BAD_REQUEST);

        assert!(report(true, None).is_clean());
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_value(report(false, Some(UploadError::TruncatedStream {
            received: 3,
            expected: Some(10),
        })))
        .unwrap();

        assert_eq!(json["transfer_mode"], "fixed-length");
        assert_eq!(json["committed"], false);
        assert_eq!(json["error"]["code"], "TRUNCATED_STREAM");
        assert_eq!(json["error"]["message"], "Stream ended early after 3 bytes");
        assert!(json.get("stored").is_none());
    }

    #[test]
    fn test_from_validation() {
        assert_eq!(
            UploadError::from_validation(&ZipValidation::Valid { entry_count: 1 }),
            None
        );
        assert_eq!(
            UploadError::from_validation(&ZipValidation::Corrupt {
                entry_count: 2,
                entry: "b.txt".into(),
                reason: "Invalid checksum".into(),
            }),
            Some(UploadError::ZipCorrupt {
                entry: "b.txt".into(),
                reason: "Invalid checksum".into(),
            })
        );
    }
}
