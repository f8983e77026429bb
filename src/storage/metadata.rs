//! Collection metadata document.
//!
//! Stored as `collection_meta.json` in the collection directory. Holds the
//! settings addressing depends on (vector size, projection shape, quantization
//! range) and the ANN index sub-document. Mutations that can race with another
//! process go through [`CollectionMetadata::update_locked`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{DistanceSpace, QuantizationStrategy};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::{MetadataLock, write_json_atomic};

pub const METADATA_FILE: &str = "collection_meta.json";

/// Value range used by range-mode quantization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationRange {
    pub min: f32,
    pub max: f32,
}

/// Metadata for a single collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Version of the metadata format
    pub version: u32,

    pub name: String,

    /// Embedding dimensionality, fixed at creation
    pub vector_size: usize,

    /// Output dimension of the projection matrix
    pub reduced_dim: usize,

    /// Directory depth of the quantized path
    pub depth_factor: usize,

    pub quantization: QuantizationStrategy,

    pub quantization_range: QuantizationRange,

    /// RFC 3339 creation timestamp
    pub created_at: String,

    /// Number of distinct source files, recomputed at session end
    #[serde(default)]
    pub unique_file_count: usize,

    /// ANN index state; absent until the first build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hnsw_index: Option<HnswMetadata>,
}

/// ANN index sub-document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswMetadata {
    pub version: u32,
    pub vector_count: usize,
    pub vector_dim: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub space: DistanceSpace,
    /// RFC 3339 timestamp of the last full build or incremental save
    pub last_rebuild: String,
    pub file_size_bytes: u64,
    /// ANN label -> point id
    #[serde(default)]
    pub id_mapping: BTreeMap<u64, String>,
    /// Next label to hand out; labels are never reused while the index lives
    #[serde(default)]
    pub next_label: u64,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_marked_stale: Option<String>,
}

impl HnswMetadata {
    pub const CURRENT_VERSION: u32 = 1;
}

impl CollectionMetadata {
    /// Current metadata version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        name: &str,
        vector_size: usize,
        reduced_dim: usize,
        depth_factor: usize,
        quantization: QuantizationStrategy,
        range: (f32, f32),
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            name: name.to_string(),
            vector_size,
            reduced_dim,
            depth_factor,
            quantization,
            quantization_range: QuantizationRange {
                min: range.0,
                max: range.1,
            },
            created_at: chrono::Utc::now().to_rfc3339(),
            unique_file_count: 0,
            hnsw_index: None,
        }
    }

    #[must_use]
    pub fn path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(METADATA_FILE)
    }

    /// Check if metadata file exists
    #[must_use]
    pub fn exists(collection_dir: &Path) -> bool {
        Self::path(collection_dir).is_file()
    }

    /// Save metadata atomically
    pub fn save(&self, collection_dir: &Path) -> StoreResult<()> {
        write_json_atomic(&Self::path(collection_dir), self)
    }

    /// Load metadata; a missing file is a configuration error.
    pub fn load(collection_dir: &Path) -> StoreResult<Self> {
        Self::try_load(collection_dir)?.ok_or_else(|| StoreError::MetadataNotFound {
            path: Self::path(collection_dir),
        })
    }

    /// Load metadata, returning `None` when the file does not exist.
    pub fn try_load(collection_dir: &Path) -> StoreResult<Option<Self>> {
        let path = Self::path(collection_dir);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_path(&path),
        };

        let metadata: Self = serde_json::from_str(&json)
            .map_err(|e| StoreError::corrupted(&path, format!("invalid metadata: {e}")))?;

        // Check version compatibility
        if metadata.version > Self::CURRENT_VERSION {
            return Err(StoreError::corrupted(
                &path,
                format!(
                    "metadata version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            ));
        }

        Ok(Some(metadata))
    }

    /// Read-modify-write under the exclusive advisory lock.
    ///
    /// The document is re-read after the lock is acquired so a concurrent
    /// writer's changes are never overwritten with a stale copy.
    pub fn update_locked<F>(collection_dir: &Path, mutate: F) -> StoreResult<Self>
    where
        F: FnOnce(&mut Self),
    {
        let _lock = MetadataLock::exclusive(collection_dir)?;
        let mut metadata = Self::load(collection_dir)?;
        mutate(&mut metadata);
        metadata.save(collection_dir)?;
        Ok(metadata)
    }

    #[must_use]
    pub fn range(&self) -> (f32, f32) {
        (self.quantization_range.min, self.quantization_range.max)
    }
}
