//! Utility functions and helpers for the dishmatch service

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{AppError, Result};

/// Name of the per-dish embedding index document
pub(crate) const INDEX_FILE: &str = "embeddings.json";

const MAX_SEGMENT_LEN: usize = 255;

/// Validate a user supplied name that becomes a single path segment.
///
/// Rejects empty names, `.`/`..`, hidden names, separators, NUL and control
/// characters, and names longer than a typical filesystem component.
pub(crate) fn sanitize_segment<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    let invalid = |reason: &str| AppError::InvalidInput(format!("{} {:?} {}", kind, name, reason));

    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_SEGMENT_LEN {
        return Err(invalid("is too long"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(invalid("contains a path separator or control character"));
    }
    Ok(name)
}

/// Validate a template filename: a plain segment that is not the index document
pub(crate) fn sanitize_filename(name: &str) -> Result<&str> {
    let name = sanitize_segment("filename", name)?;
    if name.eq_ignore_ascii_case(INDEX_FILE) {
        return Err(AppError::InvalidInput(format!(
            "filename {:?} is reserved",
            name
        )));
    }
    Ok(name)
}

/// Ensure a directory exists, creating it if necessary
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Generate a unique filename for uploads that arrive without one
pub(crate) fn generate_filename(extension: &str) -> String {
    format!("{}.{}", uuid::Uuid::new_v4(), extension.trim_start_matches('.'))
}

/// Validate that a file has an allowed extension
pub(crate) fn validate_file_extension<S: AsRef<str>>(
    filename: &str,
    allowed_extensions: &[S],
) -> bool {
    if let Some(ext) = Path::new(filename).extension() {
        if let Some(ext_str) = ext.to_str() {
            return allowed_extensions
                .iter()
                .any(|e| e.as_ref().eq_ignore_ascii_case(ext_str));
        }
    }
    false
}

/// Atomically replace `path` with `bytes`.
///
/// The data goes to a temporary file in the same directory which is then
/// renamed over the target, so readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        AppError::Internal(format!("{} has no parent directory", path.display()))
    })?;
    stage_file(dir, bytes)?.persist(path)?;
    Ok(())
}

/// Write `bytes` to a synced temporary file in `dir`.
///
/// Nothing is visible under a real name until the caller persists it; dropping
/// the handle deletes the file.
pub(crate) fn stage_file(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Serialize `value` as pretty JSON and write it atomically
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_segment() {
        assert!(sanitize_segment("dish", "pizza").is_ok());
        assert!(sanitize_segment("dish", "红烧肉").is_ok());
        assert!(sanitize_segment("dish", "mapo tofu").is_ok());

        assert!(sanitize_segment("dish", "").is_err());
        assert!(sanitize_segment("dish", "   ").is_err());
        assert!(sanitize_segment("dish", "..").is_err());
        assert!(sanitize_segment("dish", ".hidden").is_err());
        assert!(sanitize_segment("dish", "../etc").is_err());
        assert!(sanitize_segment("dish", "a/b").is_err());
        assert!(sanitize_segment("dish", "a\\b").is_err());
        assert!(sanitize_segment("dish", "a\0b").is_err());
        assert!(sanitize_segment("dish", &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_sanitize_filename_reserves_index() {
        assert!(sanitize_filename("a.jpg").is_ok());
        assert!(sanitize_filename("embeddings.json").is_err());
        assert!(sanitize_filename("EMBEDDINGS.JSON").is_err());
    }

    #[test]
    fn test_generate_filename() {
        let filename = generate_filename("jpg");
        assert!(filename.ends_with(".jpg"));
        assert_ne!(filename, generate_filename(".jpg"));
    }

    #[test]
    fn test_validate_file_extension() {
        let allowed = vec!["jpg", "jpeg", "png"];
        assert!(validate_file_extension("test.jpg", &allowed));
        assert!(validate_file_extension("test.JPEG", &allowed));
        assert!(!validate_file_extension("test.txt", &allowed));
        assert!(!validate_file_extension("test", &allowed));
    }

    #[test]
    fn test_write_json_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &serde_json::json!({ "value": 1 })).unwrap();
        write_json_atomic(&path, &serde_json::json!({ "value": 2 })).unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["value"], 2);
        // No temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_stage_file_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_file(dir.path(), b"bytes").unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"bytes");

        drop(staged);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
