//! Binary id -> record location index.
//!
//! # Storage Format
//!
//! ```text
//! u32 LE   record count
//! repeated:
//!   u16 LE + bytes   point id (UTF-8)
//!   u16 LE + bytes   record path relative to the collection directory, '/'-separated
//! ```
//!
//! Loading never returns partial data: truncation, impossible counts and bad
//! UTF-8 all fail with a corruption error.

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreResult};
use crate::index::codec::{ByteReader, put_count, put_str};
use crate::storage::{read_record, scan_point_files, write_atomic};

pub const ID_INDEX_FILE: &str = "id_index.bin";

/// Point id -> record path relative to the collection directory.
pub type IdMap = HashMap<String, PathBuf>;

/// Smallest encoded record: two empty length-prefixed strings.
const MIN_RECORD_SIZE: usize = 4;

pub struct IdIndexManager;

impl IdIndexManager {
    #[must_use]
    pub fn index_path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(ID_INDEX_FILE)
    }

    #[must_use]
    pub fn exists(collection_dir: &Path) -> bool {
        Self::index_path(collection_dir).is_file()
    }

    /// Persist `map` atomically. Records are written in id order.
    pub fn save_index(collection_dir: &Path, map: &IdMap) -> StoreResult<()> {
        let path = Self::index_path(collection_dir);
        let mut entries: Vec<(&String, &PathBuf)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut buf = Vec::with_capacity(4 + entries.len() * 64);
        put_count(&mut buf, entries.len(), &path)?;
        for (id, relative) in entries {
            put_str(&mut buf, id, &path)?;
            put_str(&mut buf, &to_slash(relative), &path)?;
        }

        write_atomic(&path, &buf)?;
        tracing::debug!(records = map.len(), path = %path.display(), "saved id index");
        Ok(())
    }

    /// Load the index. A missing file yields an empty map; check
    /// [`Self::exists`] to tell "never built" from "empty".
    pub fn load_index(collection_dir: &Path) -> StoreResult<IdMap> {
        let path = Self::index_path(collection_dir);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IdMap::new()),
            Err(e) => return Err(e).with_path(&path),
        };

        let mut reader = ByteReader::new(&bytes, &path);
        let count = reader.u32()? as usize;
        reader.check_count(count, MIN_RECORD_SIZE)?;

        let mut map = IdMap::with_capacity(count);
        for _ in 0..count {
            let id = reader.string()?;
            let relative = reader.string()?;
            map.insert(id, PathBuf::from(relative));
        }
        reader.finish()?;

        Ok(map)
    }

    /// Rebuild the mapping by scanning every record file.
    ///
    /// Unreadable records are logged and skipped.
    pub fn rebuild_from_vectors(collection_dir: &Path) -> IdMap {
        let files = scan_point_files(collection_dir);
        let map: IdMap = files
            .par_iter()
            .filter_map(|file| match read_record(file) {
                Ok(record) => {
                    let relative = file.strip_prefix(collection_dir).ok()?.to_path_buf();
                    Some((record.id, relative))
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable point record: {e}");
                    None
                }
            })
            .collect();

        tracing::info!(
            records = map.len(),
            dir = %collection_dir.display(),
            "rebuilt id index from point files"
        );
        map
    }

    /// Load the persisted index, falling back to a scan (and saving the
    /// result) when no index file exists.
    pub fn load_or_rebuild(collection_dir: &Path) -> StoreResult<IdMap> {
        if Self::exists(collection_dir) {
            return Self::load_index(collection_dir);
        }
        let map = Self::rebuild_from_vectors(collection_dir);
        Self::save_index(collection_dir, &map)?;
        Ok(map)
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
