//! Reverse index from source file path to the point ids derived from it.
//!
//! This is what keeps re-indexing a file from leaving duplicate chunks behind:
//! before new points for a file are written, the ids recorded here for that
//! file are compared against the incoming ids and the difference is deleted.

use bincode::{Decode, Encode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::write_atomic;

pub const PATH_INDEX_FILE: &str = "path_index.bin";

const FORMAT_VERSION: u32 = 1;

/// Serialized form: sets become sorted lists so the file is deterministic.
#[derive(Encode, Decode)]
struct PathIndexFile {
    version: u32,
    entries: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
    entries: HashMap<String, HashSet<String>>,
}

impl PathIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, file_path: &str, point_id: &str) {
        self.entries
            .entry(file_path.to_string())
            .or_default()
            .insert(point_id.to_string());
    }

    /// Remove one id. The path entry disappears with its last id.
    pub fn remove_point(&mut self, file_path: &str, point_id: &str) -> bool {
        let Some(ids) = self.entries.get_mut(file_path) else {
            return false;
        };
        let removed = ids.remove(point_id);
        if ids.is_empty() {
            self.entries.remove(file_path);
        }
        removed
    }

    /// Ids currently recorded for `file_path` (an owned copy).
    #[must_use]
    pub fn get_point_ids(&self, file_path: &str) -> HashSet<String> {
        self.entries.get(file_path).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn contains_path(&self, file_path: &str) -> bool {
        self.entries.contains_key(file_path)
    }

    /// Number of distinct source files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.entries.values().map(HashSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn file_path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(PATH_INDEX_FILE)
    }

    pub fn save(&self, collection_dir: &Path) -> StoreResult<()> {
        let path = Self::file_path(collection_dir);
        let mut entries: Vec<(String, Vec<String>)> = self
            .entries
            .iter()
            .map(|(file, ids)| {
                let mut ids: Vec<String> = ids.iter().cloned().collect();
                ids.sort();
                (file.clone(), ids)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let bytes = bincode::encode_to_vec(
            PathIndexFile {
                version: FORMAT_VERSION,
                entries,
            },
            bincode::config::standard(),
        )
        .map_err(|e| StoreError::Serialization {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        write_atomic(&path, &bytes)
    }

    /// Load the index; a missing file means it was never built and yields an
    /// empty index.
    pub fn load(collection_dir: &Path) -> StoreResult<Self> {
        let path = Self::file_path(collection_dir);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e).with_path(&path),
        };

        let (file, read): (PathIndexFile, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| StoreError::corrupted(&path, format!("undecodable path index: {e}")))?;
        if read != bytes.len() {
            return Err(StoreError::corrupted(
                &path,
                format!("{} trailing bytes", bytes.len() - read),
            ));
        }
        if file.version != FORMAT_VERSION {
            return Err(StoreError::corrupted(
                &path,
                format!("unsupported path index version {}", file.version),
            ));
        }

        let entries = file
            .entries
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(path, ids)| (path, ids.into_iter().collect()))
            .collect();
        Ok(Self { entries })
    }
}
