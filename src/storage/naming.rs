//! File name sanitization

use super::StorageError;

/// Reduce a caller-supplied name to a safe base file name.
///
/// Only the last path component survives (both `/` and `\` separate), control
/// characters are dropped and leading dots are stripped, so the result can
/// never address a parent directory or collide with a hidden staging file.
pub fn sanitize_file_name(raw: &str) -> Result<String, StorageError> {
    let base = raw
        .rsplit(['/', '\\'])
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or("");

    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim().trim_start_matches('.');

    if cleaned.is_empty() {
        return Err(StorageError::InvalidName(raw.to_string()));
    }

    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_kept() {
        assert_eq!(sanitize_file_name("report.csv").unwrap(), "report.csv");
        assert_eq!(sanitize_file_name("data eps.zip").unwrap(), "data eps.zip");
    }

    #[test]
    fn test_traversal_is_reduced_to_base_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("/abs/path/out.zip").unwrap(), "out.zip");
        assert_eq!(sanitize_file_name("..\\..\\win.ini").unwrap(), "win.ini");
        assert_eq!(sanitize_file_name("dir/sub/").unwrap(), "sub");
    }

    #[test]
    fn test_hidden_and_dot_names() {
        assert_eq!(sanitize_file_name(".bashrc").unwrap(), "bashrc");
        assert_eq!(sanitize_file_name("..hidden.part").unwrap(), "hidden.part");
        assert!(matches!(sanitize_file_name(".."), Err(StorageError::InvalidName(_))));
        assert!(matches!(sanitize_file_name("."), Err(StorageError::InvalidName(_))));
        assert!(matches!(sanitize_file_name("../.."), Err(StorageError::InvalidName(_))));
    }

    #[test]
    fn test_empty_and_control_only() {
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("   ").is_err());
        assert!(sanitize_file_name("\0\n").is_err());
        assert_eq!(sanitize_file_name("a\0b.txt").unwrap(), "ab.txt");
    }
}
