//! Upload Receiver
//!
//! Drains one inbound byte stream into a hidden staging file, optionally
//! validates it as a ZIP archive, and publishes it under its final name with a
//! single rename. Every call yields an `UploadReport`; nothing is raised.

use std::io;

use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::archive::{validate_zip, ZipValidation};
use crate::storage::{sanitize_file_name, ContentDir, StagingGuard};

use super::chunked::{ChunkedDecoder, ChunkedError};
use super::types::{
    ContentKind, StoredFile, TransferMode, UploadError, UploadReport, UploadRequest,
    DEFAULT_CHUNK_SIZE,
};

/// Receives uploads into one content directory
#[derive(Debug, Clone)]
pub struct UploadReceiver {
    dir: ContentDir,
    chunk_size: usize,
}

/// An ingestion in progress. Finalized exactly once by commit or discard.
struct Upload {
    name: String,
    request: UploadRequest,
    staging: StagingGuard,
    bytes_received: u64,
    hasher: Sha256,
}

impl Upload {
    fn record(&mut self, chunk: &[u8]) {
        self.bytes_received += chunk.len() as u64;
        self.hasher.update(chunk);
    }

    fn matched_declared_length(&self) -> bool {
        self.request
            .declared_length
            .map_or(true, |declared| declared == self.bytes_received)
    }

    fn report(&self, committed: bool) -> UploadReport {
        UploadReport {
            destination: self.name.clone(),
            transfer_mode: self.request.transfer_mode,
            bytes_received: self.bytes_received,
            declared_length: self.request.declared_length,
            matched_declared_length: self.matched_declared_length(),
            zip_validation: None,
            committed,
            stored: None,
            error: None,
        }
    }
}

impl UploadReceiver {
    pub fn new(dir: ContentDir) -> Self {
        Self {
            dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the read buffer size (minimum 1 byte)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn content_dir(&self) -> &ContentDir {
        &self.dir
    }

    /// Receive one upload from `source`
    pub async fn receive<R>(&self, request: UploadRequest, source: R) -> UploadReport
    where
        R: AsyncRead + Unpin,
    {
        let name = match sanitize_file_name(&request.destination_name) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!(
                    destination = %request.destination_name,
                    "Rejected upload with unusable file name"
                );
                return UploadReport {
                    destination: request.destination_name.clone(),
                    transfer_mode: request.transfer_mode,
                    bytes_received: 0,
                    declared_length: request.declared_length,
                    matched_declared_length: request.declared_length.map_or(true, |l| l == 0),
                    zip_validation: None,
                    committed: false,
                    stored: None,
                    error: Some(UploadError::InvalidName(request.destination_name)),
                };
            }
        };

        let mut upload = Upload {
            staging: StagingGuard::new(self.dir.staging_path(&name)),
            name,
            request,
            bytes_received: 0,
            hasher: Sha256::new(),
        };

        tracing::debug!(
            file_name = %upload.name,
            mode = ?upload.request.transfer_mode,
            declared_length = ?upload.request.declared_length,
            staging = %upload.staging.path().display(),
            "Receiving upload"
        );

        if let Err(error) = self.drain(&mut upload, source).await {
            return self.discard(upload, error).await;
        }

        if upload.bytes_received == 0 {
            return self.discard(upload, UploadError::EmptyPayload).await;
        }

        let zip_validation = if upload.request.expect_zip {
            Some(validate_zip(upload.staging.path()).await)
        } else {
            None
        };

        self.commit(upload, zip_validation).await
    }

    /// Copy the payload into the staging file in bounded chunks
    async fn drain<R>(&self, upload: &mut Upload, source: R) -> Result<(), UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(upload.staging.path())
            .await
            .map_err(|e| UploadError::Io(format!("cannot create staging file: {}", e)))?;

        let mut buf = vec![0u8; self.chunk_size];

        match upload.request.transfer_mode {
            TransferMode::FixedLength => {
                let declared = upload.request.declared_length.ok_or_else(|| {
                    UploadError::ProtocolError(
                        "fixed-length transfer without a declared length".to_string(),
                    )
                })?;
                let mut source = source;
                while upload.bytes_received < declared {
                    let want = (declared - upload.bytes_received).min(buf.len() as u64) as usize;
                    let n = source
                        .read(&mut buf[..want])
                        .await
                        .map_err(|e| read_error(upload, e))?;
                    if n == 0 {
                        return Err(truncated(upload));
                    }
                    write_chunk(&mut file, upload, &buf[..n]).await?;
                }
            }
            TransferMode::Chunked => {
                let mut decoder = ChunkedDecoder::new(source);
                loop {
                    let n = decoder
                        .read(&mut buf)
                        .await
                        .map_err(|e| chunked_error(upload, e))?;
                    if n == 0 {
                        break;
                    }
                    write_chunk(&mut file, upload, &buf[..n]).await?;
                }
                tracing::debug!(file_name = %upload.name, frames = decoder.frames(), "Chunked stream complete");
                check_declared(upload)?;
            }
            TransferMode::Unbounded => {
                let mut source = source;
                loop {
                    let n = source
                        .read(&mut buf)
                        .await
                        .map_err(|e| read_error(upload, e))?;
                    if n == 0 {
                        break;
                    }
                    write_chunk(&mut file, upload, &buf[..n]).await?;
                }
                check_declared(upload)?;
            }
        }

        file.flush()
            .await
            .map_err(|e| UploadError::Io(format!("flush failed: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| UploadError::Io(format!("sync failed: {}", e)))?;

        Ok(())
    }

    async fn commit(&self, mut upload: Upload, zip_validation: Option<ZipValidation>) -> UploadReport {
        if let Err(e) = self.dir.commit(upload.staging.path(), &upload.name).await {
            tracing::error!(file_name = %upload.name, error = %e, "Failed to commit upload");
            return self
                .discard(upload, UploadError::Io(format!("commit failed: {}", e)))
                .await;
        }
        upload.staging.disarm();

        let mut report = upload.report(true);
        let kind = if zip_validation.as_ref().is_some_and(ZipValidation::is_valid) {
            ContentKind::Zip
        } else {
            ContentKind::Opaque
        };
        let stored = StoredFile {
            name: upload.name.clone(),
            size: upload.bytes_received,
            kind,
            sha256: hex::encode(upload.hasher.finalize()),
        };

        report.error = zip_validation.as_ref().and_then(UploadError::from_validation);
        match &report.error {
            Some(warning) => tracing::warn!(
                file_name = %stored.name,
                bytes_received = stored.size,
                warning = %warning,
                "Stored upload failed ZIP validation"
            ),
            None => tracing::info!(
                file_name = %stored.name,
                bytes_received = stored.size,
                sha256 = %stored.sha256,
                "Upload stored"
            ),
        }

        report.zip_validation = zip_validation;
        report.stored = Some(stored);
        report
    }

    async fn discard(&self, upload: Upload, error: UploadError) -> UploadReport {
        tracing::warn!(
            file_name = %upload.name,
            bytes_received = upload.bytes_received,
            error = %error,
            "Upload discarded"
        );

        let mut report = upload.report(false);
        report.error = Some(error);
        upload.staging.discard().await;
        report
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn write_chunk(file: &mut File, upload: &mut Upload, chunk: &[u8]) -> Result<(), UploadError> {
    file.write_all(chunk)
        .await
        .map_err(|e| UploadError::Io(format!("write failed: {}", e)))?;
    upload.record(chunk);
    Ok(())
}

fn truncated(upload: &Upload) -> UploadError {
    UploadError::TruncatedStream {
        received: upload.bytes_received,
        expected: upload.request.declared_length,
    }
}

fn read_error(upload: &Upload, e: io::Error) -> UploadError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => truncated(upload),
        io::ErrorKind::InvalidData => UploadError::ProtocolError(e.to_string()),
        _ => UploadError::Io(format!("read failed: {}", e)),
    }
}

fn chunked_error(upload: &Upload, e: ChunkedError) -> UploadError {
    match e {
        ChunkedError::UnexpectedEof => truncated(upload),
        ChunkedError::Io(e) => read_error(upload, e),
        other => UploadError::ProtocolError(other.to_string()),
    }
}

/// A length declared next to a self-delimiting transfer must agree with it
fn check_declared(upload: &Upload) -> Result<(), UploadError> {
    match upload.request.declared_length {
        Some(declared) if upload.bytes_received < declared => Err(truncated(upload)),
        Some(declared) if upload.bytes_received > declared => Err(UploadError::ProtocolError(
            format!(
                "received {} bytes, more than the declared {}",
                upload.bytes_received, declared
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::ReadBuf;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn receiver(temp_dir: &TempDir) -> UploadReceiver {
        UploadReceiver::new(ContentDir::new(temp_dir.path())).with_chunk_size(4)
    }

    fn dir_entries(temp_dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn sample_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Yields its data and then fails, like a peer resetting the connection
    struct FailingReader {
        data: Vec<u8>,
        kind: io::ErrorKind,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.data.is_empty() {
                return Poll::Ready(Err(io::Error::new(self.kind, "peer went away")));
            }
            let n = self.data.len().min(buf.remaining());
            let chunk: Vec<u8> = self.data.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_fixed_length_exact() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::fixed_length("data.csv", 10), &b"0123456789"[..])
            .await;

        assert!(report.is_clean());
        assert_eq!(report.bytes_received, 10);
        assert!(report.matched_declared_length);
        assert!(report.zip_validation.is_none());

        let stored = report.stored.unwrap();
        assert_eq!(stored.kind, ContentKind::Opaque);
        assert_eq!(stored.size, 10);
        assert_eq!(stored.sha256, hex::encode(Sha256::digest(b"0123456789")));

        assert_eq!(std::fs::read(temp_dir.path().join("data.csv")).unwrap(), b"0123456789");
        assert_eq!(dir_entries(&temp_dir), vec!["data.csv"]);
    }

    #[tokio::test]
    async fn test_fixed_length_ignores_excess_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::fixed_length("a.txt", 3), &b"abcdef"[..])
            .await;

        assert!(report.committed);
        assert_eq!(report.bytes_received, 3);
        assert_eq!(std::fs::read(temp_dir.path().join("a.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_fixed_length_truncated_is_not_committed() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::fixed_length("data.csv", 100), &b"only 17 bytes ..."[..])
            .await;

        assert!(!report.committed);
        assert!(!report.matched_declared_length);
        assert_eq!(report.bytes_received, 17);
        assert_eq!(
            report.error,
            Some(UploadError::TruncatedStream {
                received: 17,
                expected: Some(100)
            })
        );
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_fixed_length_without_length_is_protocol_error() {
        let temp_dir = TempDir::new().unwrap();
        let request = UploadRequest::fixed_length("a.bin", 1).with_declared_length(None);
        let report = receiver(&temp_dir).receive(request, &b"x"[..]).await;

        assert!(matches!(report.error, Some(UploadError::ProtocolError(_))));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_chunked_payload() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::chunked("test.txt"), &b"4\r\ntest\r\n0\r\n\r\n"[..])
            .await;

        assert!(report.is_clean());
        assert_eq!(report.bytes_received, 4);
        assert!(report.matched_declared_length);
        assert_eq!(std::fs::read(temp_dir.path().join("test.txt")).unwrap(), b"test");
    }

    #[tokio::test]
    async fn test_chunked_malformed_length() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::chunked("x.txt"), &b"4\r\ntest\r\nnope\r\nmore\r\n0\r\n\r\n"[..])
            .await;

        assert!(!report.committed);
        assert_eq!(report.bytes_received, 4);
        assert!(matches!(report.error, Some(UploadError::ProtocolError(_))));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_chunked_cut_off_mid_frame() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::chunked("x.txt"), &b"8\r\nabc"[..])
            .await;

        assert!(matches!(report.error, Some(UploadError::TruncatedStream { received: 3, .. })));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_chunked_with_declared_length_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let request = UploadRequest::chunked("x.txt").with_declared_length(Some(2));
        let report = receiver(&temp_dir).receive(request, &b"4\r\ntest\r\n0\r\n\r\n"[..]).await;

        assert!(!report.committed);
        assert!(!report.matched_declared_length);
        assert!(matches!(report.error, Some(UploadError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_unbounded_until_close() {
        let temp_dir = TempDir::new().unwrap();
        let payload = vec![7u8; 10_000];
        let report = receiver(&temp_dir)
            .receive(UploadRequest::unbounded("blob.bin"), payload.as_slice())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.bytes_received, 10_000);
        assert!(report.matched_declared_length);
    }

    #[tokio::test]
    async fn test_empty_payload_is_never_committed() {
        let temp_dir = TempDir::new().unwrap();

        for request in [
            UploadRequest::unbounded("empty.bin"),
            UploadRequest::fixed_length("empty.bin", 0),
            UploadRequest::chunked("empty.bin"),
        ] {
            let mode = request.transfer_mode;
            let body: &[u8] = if mode == TransferMode::Chunked { b"0\r\n\r\n" } else { b"" };
            let report = receiver(&temp_dir).receive(request, body).await;

            assert!(!report.committed, "{:?}", mode);
            assert_eq!(report.error, Some(UploadError::EmptyPayload), "{:?}", mode);
        }
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_connection_reset_discards_staging() {
        let temp_dir = TempDir::new().unwrap();
        let source = FailingReader {
            data: b"partial data".to_vec(),
            kind: io::ErrorKind::ConnectionReset,
        };
        let report = receiver(&temp_dir)
            .receive(UploadRequest::unbounded("out.bin"), source)
            .await;

        assert!(!report.committed);
        assert_eq!(report.bytes_received, 12);
        assert!(matches!(report.error, Some(UploadError::TruncatedStream { .. })));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_other_read_errors_are_io() {
        let temp_dir = TempDir::new().unwrap();
        let source = FailingReader {
            data: b"abc".to_vec(),
            kind: io::ErrorKind::Other,
        };
        let report = receiver(&temp_dir)
            .receive(UploadRequest::fixed_length("out.bin", 10), source)
            .await;

        assert!(matches!(report.error, Some(UploadError::Io(_))));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_source_is_protocol_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = FailingReader {
            data: b"--boundary".to_vec(),
            kind: io::ErrorKind::InvalidData,
        };
        let report = receiver(&temp_dir)
            .receive(UploadRequest::unbounded("form.bin"), source)
            .await;

        assert!(matches!(report.error, Some(UploadError::ProtocolError(_))));
        assert_eq!(report.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(dir_entries(&temp_dir).is_empty());
    }

    /// Never yields; stands in for a client that stopped sending
    struct StalledReader;

    impl AsyncRead for StalledReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_dropped_receive_removes_staging_file() {
        let temp_dir = TempDir::new().unwrap();
        let receiver = receiver(&temp_dir);
        let source = AsyncReadExt::chain(&b"partial"[..], StalledReader);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            receiver.receive(UploadRequest::unbounded("stalled.bin"), source),
        )
        .await;

        assert!(outcome.is_err());
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_leave_one_complete_version() {
        let temp_dir = TempDir::new().unwrap();
        let receiver = UploadReceiver::new(ContentDir::new(temp_dir.path())).with_chunk_size(1024);
        let first = vec![b'a'; 200 * 1024];
        let second = vec![b'b'; 100 * 1024];

        let (a, b) = tokio::join!(
            receiver.receive(UploadRequest::unbounded("x.bin"), first.as_slice()),
            receiver.receive(UploadRequest::unbounded("x.bin"), second.as_slice()),
        );

        assert!(a.is_clean());
        assert!(b.is_clean());
        assert_eq!(dir_entries(&temp_dir), vec!["x.bin"]);
        let stored = std::fs::read(temp_dir.path().join("x.bin")).unwrap();
        assert!(stored == first || stored == second);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("result.zip"), b"previous").unwrap();

        let report = receiver(&temp_dir)
            .receive(UploadRequest::fixed_length("result.zip", 50), &b"new but short"[..])
            .await;

        assert!(!report.committed);
        assert_eq!(std::fs::read(temp_dir.path().join("result.zip")).unwrap(), b"previous");
        assert_eq!(dir_entries(&temp_dir), vec!["result.zip"]);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("out.txt"), b"a much longer previous version").unwrap();

        let report = receiver(&temp_dir)
            .receive(UploadRequest::unbounded("out.txt"), &b"short"[..])
            .await;

        assert!(report.committed);
        assert_eq!(std::fs::read(temp_dir.path().join("out.txt")).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_traversal_name_stays_in_content_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("results");
        std::fs::create_dir(&root).unwrap();
        let receiver = UploadReceiver::new(ContentDir::new(&root));

        let report = receiver
            .receive(UploadRequest::unbounded("../../etc/passwd"), &b"root:x:0:0"[..])
            .await;

        assert!(report.committed);
        assert_eq!(report.destination, "passwd");
        assert!(root.join("passwd").exists());
        assert!(!temp_dir.path().join("passwd").exists());
    }

    #[tokio::test]
    async fn test_unusable_name_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let report = receiver(&temp_dir)
            .receive(UploadRequest::unbounded("../.."), &b"data"[..])
            .await;

        assert!(!report.committed);
        assert_eq!(report.bytes_received, 0);
        assert!(matches!(report.error, Some(UploadError::InvalidName(_))));
        assert!(dir_entries(&temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_valid_zip_upload() {
        let temp_dir = TempDir::new().unwrap();
        let bytes = sample_zip(&[("a.csv", b"1,2"), ("b.csv", b"3,4")]);
        let request = UploadRequest::fixed_length("result.zip", bytes.len() as u64).expecting_zip(true);

        let report = receiver(&temp_dir).receive(request, bytes.as_slice()).await;

        assert!(report.is_clean());
        assert_eq!(report.zip_validation, Some(ZipValidation::Valid { entry_count: 2 }));
        assert_eq!(report.stored.unwrap().kind, ContentKind::Zip);
    }

    #[tokio::test]
    async fn test_corrupt_zip_is_committed_with_warning() {
        let temp_dir = TempDir::new().unwrap();
        let mut bytes = sample_zip(&[("data.csv", b"id,value\n1,100\n")]);
        // local header (30) + "data.csv" (8), no extra field for stored entries
        let extra_len = u16::from_le_bytes([bytes[28], bytes[29]]) as usize;
        bytes[30 + 8 + extra_len + 2] ^= 0x55;

        let request = UploadRequest::unbounded("result.zip").expecting_zip(true);
        let report = receiver(&temp_dir).receive(request, bytes.as_slice()).await;

        assert!(report.committed);
        assert!(matches!(
            report.warning(),
            Some(UploadError::ZipCorrupt { entry, .. }) if entry == "data.csv"
        ));
        assert_eq!(report.stored.unwrap().kind, ContentKind::Opaque);
        assert!(temp_dir.path().join("result.zip").exists());
    }

    #[tokio::test]
    async fn test_non_zip_payload_with_zip_name() {
        let temp_dir = TempDir::new().unwrap();
        let request = UploadRequest::unbounded("result.zip").expecting_zip(true);
        let report = receiver(&temp_dir).receive(request, &b"plain,csv\n"[..]).await;

        assert!(report.committed);
        assert!(matches!(report.warning(), Some(UploadError::ZipNotAnArchive(_))));
    }
}
