//! Atomic file replacement.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{IoContext, StoreError, StoreResult};

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// Readers observe either the previous content or the new content, never a
/// partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let parent = path.parent().ok_or_else(|| StoreError::InvalidArgument {
        reason: format!("'{}' has no parent directory", path.display()),
    })?;
    std::fs::create_dir_all(parent).with_path(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).with_path(parent)?;
    tmp.write_all(bytes).with_path(tmp.path())?;
    tmp.flush().with_path(tmp.path())?;
    tmp.as_file().sync_data().with_path(tmp.path())?;
    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &json)
}
