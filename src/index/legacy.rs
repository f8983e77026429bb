//! Legacy Hamming-distance candidate index.
//!
//! Older collections selected search candidates by comparing quantized codes
//! bit by bit. The ANN index is authoritative for search; this index is only
//! maintained when `storage.legacy_index` is enabled and is queried through
//! `FilesystemVectorStore::legacy_candidates`.
//!
//! # Storage Format
//!
//! - Header (12 bytes): magic `CVLX`, version, record count (u32 little-endian)
//! - Records: u16 length-prefixed id, then the 16-byte quantized code

use memmap2::MmapOptions;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};
use crate::index::codec::{ByteReader, put_count, put_str};
use crate::storage::write_atomic;

pub const LEGACY_INDEX_FILE: &str = "vector_index.bin";

/// Magic bytes to identify legacy index files.
const MAGIC_BYTES: &[u8; 4] = b"CVLX";

const FORMAT_VERSION: u32 = 1;

/// Bytes per packed code (32 hex characters).
pub const CODE_BYTES: usize = 16;

/// Empty id plus a code.
const MIN_RECORD_SIZE: usize = 2 + CODE_BYTES;

pub type Code = [u8; CODE_BYTES];

/// In-memory legacy index: point id -> packed quantized code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorIndexManager {
    entries: HashMap<String, Code>,
}

impl VectorIndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the quantized hex code of `id`, replacing any previous one.
    pub fn add_entry(&mut self, id: &str, hex: &str) -> StoreResult<()> {
        let code = parse_code(hex)?;
        self.entries.insert(id.to_string(), code);
        Ok(())
    }

    pub fn remove_entry(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Number of differing bits between two codes.
    #[must_use]
    pub fn hamming_distance(a: &Code, b: &Code) -> u32 {
        a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
    }

    /// Ids whose code lies within `max_distance` bits of `query_hex`,
    /// closest first, ties broken by id.
    pub fn find_candidates(
        &self,
        query_hex: &str,
        max_distance: u32,
        limit: usize,
    ) -> StoreResult<Vec<(String, u32)>> {
        let query = parse_code(query_hex)?;
        let mut candidates: Vec<(String, u32)> = self
            .entries
            .iter()
            .filter_map(|(id, code)| {
                let distance = Self::hamming_distance(&query, code);
                (distance <= max_distance).then(|| (id.clone(), distance))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(limit);
        Ok(candidates)
    }

    #[must_use]
    pub fn file_path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(LEGACY_INDEX_FILE)
    }

    pub fn save(&self, collection_dir: &Path) -> StoreResult<()> {
        let path = Self::file_path(collection_dir);
        let mut entries: Vec<(&String, &Code)> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut buf = Vec::with_capacity(12 + entries.len() * (MIN_RECORD_SIZE + 32));
        buf.extend_from_slice(MAGIC_BYTES);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        put_count(&mut buf, entries.len(), &path)?;
        for (id, code) in entries {
            put_str(&mut buf, id, &path)?;
            buf.extend_from_slice(code);
        }
        write_atomic(&path, &buf)
    }

    /// Load through a read-only memory map. A missing file yields an empty
    /// index.
    pub fn load(collection_dir: &Path) -> StoreResult<Self> {
        let path = Self::file_path(collection_dir);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e).with_path(&path),
        };
        // SAFETY: the file is never written in place. `save` replaces it
        // through an atomic rename, so this mapping keeps the old inode.
        let mmap = unsafe { MmapOptions::new().map(&file).with_path(&path)? };

        let mut reader = ByteReader::new(&mmap, &path);
        if reader.take(4)? != MAGIC_BYTES {
            return Err(reader.corrupted("invalid magic bytes".to_string()));
        }
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(reader.corrupted(format!("unsupported legacy index version {version}")));
        }
        let count = reader.u32()? as usize;
        reader.check_count(count, MIN_RECORD_SIZE)?;

        let mut entries = HashMap::with_capacity(count);
        for _ in 0..count {
            let id = reader.string()?;
            let mut code = [0u8; CODE_BYTES];
            code.copy_from_slice(reader.take(CODE_BYTES)?);
            entries.insert(id, code);
        }
        reader.finish()?;

        Ok(Self { entries })
    }
}

fn parse_code(hex: &str) -> StoreResult<Code> {
    if hex.len() != CODE_BYTES * 2 {
        return Err(StoreError::InvalidArgument {
            reason: format!(
                "legacy index codes are {} hex characters, got {}",
                CODE_BYTES * 2,
                hex.len()
            ),
        });
    }
    let mut code = [0u8; CODE_BYTES];
    for (i, byte) in code.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
            StoreError::InvalidArgument {
                reason: format!("'{hex}' is not a hex code"),
            }
        })?;
    }
    Ok(code)
}
