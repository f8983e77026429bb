//! Point record files.
//!
//! Each live point is one JSON file under the collection's quantized
//! directory tree. Ids that are short and filesystem-safe are used directly in
//! the file name; anything else is replaced by a truncated SHA-256 of the id so
//! path length stays bounded.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::write_json_atomic;
use crate::types::PointRecord;

const POINT_FILE_PREFIX: &str = "vector_";
const POINT_FILE_SUFFIX: &str = ".json";

/// Longest id embedded verbatim in a file name.
const MAX_DIRECT_ID_LEN: usize = 100;

/// Hex characters kept from the id hash.
const HASHED_NAME_LEN: usize = 16;

/// File name of the record for `id`.
#[must_use]
pub fn point_file_name(id: &str) -> String {
    let direct = !id.is_empty()
        && id.len() <= MAX_DIRECT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if direct {
        format!("{POINT_FILE_PREFIX}{id}{POINT_FILE_SUFFIX}")
    } else {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!(
            "{POINT_FILE_PREFIX}{}{POINT_FILE_SUFFIX}",
            &digest[..HASHED_NAME_LEN]
        )
    }
}

/// True when `path` names a point record file.
#[must_use]
pub fn is_point_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with(POINT_FILE_PREFIX) && name.ends_with(POINT_FILE_SUFFIX)
        })
}

/// Decode one record. Malformed JSON is reported as corruption.
pub fn read_record(path: &Path) -> StoreResult<PointRecord> {
    let bytes = std::fs::read(path).with_path(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::corrupted(path, format!("invalid point record: {e}")))
}

pub fn write_record(path: &Path, record: &PointRecord) -> StoreResult<()> {
    write_json_atomic(path, record)
}

/// All point files below `collection_dir`, sorted by path.
pub fn scan_point_files(collection_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(collection_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry during scan: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_point_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}
