//! ZIP structural validation
//!
//! Opens the central directory and then reads every entry to the end, which
//! makes the `zip` crate verify each entry's CRC-32 against its decompressed
//! bytes. The outcome is always one of three conclusive states; I/O failures
//! are folded into those states with the cause kept as a reason string.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::ZipArchive;

/// Local file header signature
const LOCAL_HEADER_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// End of central directory signature (an archive with no entries)
const EMPTY_ARCHIVE_MAGIC: [u8; 4] = *b"PK\x05\x06";

/// Outcome of validating a file as a ZIP archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "validity", rename_all = "snake_case")]
pub enum ZipValidation {
    /// Every entry decompressed and matched its checksum
    Valid { entry_count: usize },

    /// The archive opened but an entry failed its integrity test
    Corrupt {
        entry_count: usize,
        entry: String,
        reason: String,
    },

    /// The file could not be treated as a ZIP archive at all
    NotAZip { reason: String },
}

impl ZipValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, ZipValidation::Valid { .. })
    }

    fn not_a_zip(reason: impl Into<String>) -> Self {
        ZipValidation::NotAZip {
            reason: reason.into(),
        }
    }
}

/// Validate `path` on the blocking thread pool
pub async fn validate_zip(path: impl Into<PathBuf>) -> ZipValidation {
    let path = path.into();
    match tokio::task::spawn_blocking(move || validate_zip_blocking(&path)).await {
        Ok(result) => result,
        Err(e) => ZipValidation::not_a_zip(format!("validation task failed: {}", e)),
    }
}

/// Validate `path` synchronously. Never mutates the file.
pub fn validate_zip_blocking(path: &Path) -> ZipValidation {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return ZipValidation::not_a_zip(format!("cannot open file: {}", e)),
    };

    let size = match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(e) => return ZipValidation::not_a_zip(format!("cannot stat file: {}", e)),
    };
    if size == 0 {
        return ZipValidation::not_a_zip("empty");
    }

    let magic = match read_magic(&mut file) {
        Ok(magic) => magic,
        Err(e) => return ZipValidation::not_a_zip(format!("cannot read header: {}", e)),
    };

    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            let header = if magic == Some(LOCAL_HEADER_MAGIC) {
                "ZIP header present".to_string()
            } else {
                format!("missing ZIP header, file starts with {}", describe_magic(magic))
            };
            return ZipValidation::not_a_zip(format!("{}: {}", header, e));
        }
    };

    // The zip crate tolerates data prepended to an archive; uploads must not
    // carry any.
    if magic != Some(LOCAL_HEADER_MAGIC) && magic != Some(EMPTY_ARCHIVE_MAGIC) {
        return ZipValidation::not_a_zip(format!(
            "unexpected leading bytes before archive data ({})",
            describe_magic(magic)
        ));
    }

    let entry_count = archive.len();
    for index in 0..entry_count {
        let name = archive
            .name_for_index(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index));

        if let Err(reason) = test_entry(&mut archive, index) {
            tracing::debug!(entry = %name, reason = %reason, "ZIP entry failed integrity test");
            return ZipValidation::Corrupt {
                entry_count,
                entry: name,
                reason,
            };
        }
    }

    ZipValidation::Valid { entry_count }
}

/// Decompress one entry fully; the reader checks CRC-32 at end of data
fn test_entry(archive: &mut ZipArchive<File>, index: usize) -> Result<(), String> {
    // Without a password the checksum of an encrypted entry cannot be checked
    if archive.by_index_raw(index).map_err(|e| e.to_string())?.encrypted() {
        return Err("encrypted entry, checksum cannot be verified without a password".to_string());
    }

    let mut entry = archive.by_index(index).map_err(|e| e.to_string())?;
    let expected = entry.size();
    let actual = io::copy(&mut entry, &mut io::sink()).map_err(|e| e.to_string())?;

    if actual != expected {
        return Err(format!(
            "size mismatch: expected {} bytes, got {}",
            expected, actual
        ));
    }
    Ok(())
}

fn read_magic(file: &mut File) -> io::Result<Option<[u8; 4]>> {
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(Some(magic)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn describe_magic(magic: Option<[u8; 4]>) -> String {
    match magic {
        Some(bytes) => format!("0x{}", hex::encode(bytes)),
        None => "fewer than 4 bytes".to_string(),
    }
}
