//! Utility functions for Arbor.

use std::fs;
use std::path::Path;

use crate::error::{ArborError, Result};

/// Maximum file size that can be read into memory (10 MB).
///
/// Applies to course data files and JSONL event batches, which arrive from
/// outside. Student records and the event log are written by the engine
/// and are not capped.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

/// Read a file into a string with size limit protection.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read a file into a string with a custom size limit.
///
/// # Errors
///
/// Returns an error if the file exceeds `max_size` or cannot be read.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| ArborError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(ArborError::storage(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("file is too large ({} bytes, max {} bytes)", size, max_size),
            ),
        ));
    }

    fs::read_to_string(path).map_err(|e| ArborError::storage(path, e))
}

/// Check that an identifier is safe to use as a file name.
///
/// Accepts ASCII letters, digits, `.`, `_`, `@` and `-`, and rejects
/// empty ids or ids starting with `.`.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'))
}
