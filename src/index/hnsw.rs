//! HNSW index lifecycle over USearch.
//!
//! The graph itself is owned by USearch and persisted as `hnsw_index.bin`.
//! This module keeps the label <-> point id mapping, records the index state
//! in the collection metadata (`hnsw_index` sub-document) and decides when the
//! on-disk graph can no longer be trusted.
//!
//! State machine:
//!
//! ```text
//! Fresh --(deferred update)--> Stale --(rebuild / incremental save)--> Fresh
//! ```
//!
//! A missing index, missing metadata, or a stored vector count that differs
//! from the number of point files on disk always reads as Stale.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::config::{DistanceSpace, HnswConfig};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::{CollectionMetadata, HnswMetadata, read_record, scan_point_files};

pub const HNSW_INDEX_FILE: &str = "hnsw_index.bin";

/// Minimum capacity reserved when the graph grows.
const MIN_RESERVE: usize = 64;

/// A loaded ANN graph with its label mapping.
pub struct AnnIndex {
    index: Index,
    id_to_label: HashMap<String, u64>,
    label_to_id: BTreeMap<u64, String>,
    next_label: u64,
    dim: usize,
}

impl std::fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnIndex")
            .field("len", &self.label_to_id.len())
            .field("next_label", &self.next_label)
            .field("dim", &self.dim)
            .finish()
    }
}

impl AnnIndex {
    fn create(dim: usize, config: &HnswConfig, capacity: usize) -> StoreResult<Self> {
        let index = Index::new(&index_options(dim, config))
            .map_err(|e| StoreError::ann("create index", e))?;
        index
            .reserve(capacity.max(MIN_RESERVE))
            .map_err(|e| StoreError::ann("reserve capacity", e))?;
        Ok(Self {
            index,
            id_to_label: HashMap::new(),
            label_to_id: BTreeMap::new(),
            next_label: 0,
            dim,
        })
    }

    /// Number of live vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.label_to_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label_to_id.is_empty()
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.id_to_label.contains_key(id)
    }

    fn ensure_capacity(&self, additional: usize) -> StoreResult<()> {
        let needed = self.index.size() + additional;
        if needed > self.index.capacity() {
            let target = needed.max(self.index.capacity() * 2).max(MIN_RESERVE);
            self.index
                .reserve(target)
                .map_err(|e| StoreError::ann("reserve capacity", e))?;
        }
        Ok(())
    }

    /// Insert or replace the vector of `id`, keeping its label when it exists.
    fn upsert(&mut self, id: &str, vector: &[f32]) -> StoreResult<()> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                id: id.to_string(),
                expected: self.dim,
                actual: vector.len(),
            });
        }

        let label = match self.id_to_label.get(id) {
            Some(&label) => {
                self.index
                    .remove(label)
                    .map_err(|e| StoreError::ann("remove before update", e))?;
                label
            }
            None => {
                let label = self.next_label;
                self.next_label += 1;
                label
            }
        };

        self.ensure_capacity(1)?;
        self.index
            .add(label, vector)
            .map_err(|e| StoreError::ann("add vector", e))?;
        self.id_to_label.insert(id.to_string(), label);
        self.label_to_id.insert(label, id.to_string());
        Ok(())
    }

    fn remove(&mut self, id: &str) -> StoreResult<bool> {
        let Some(label) = self.id_to_label.remove(id) else {
            return Ok(false);
        };
        self.label_to_id.remove(&label);
        self.index
            .remove(label)
            .map_err(|e| StoreError::ann("remove vector", e))?;
        Ok(true)
    }

    /// Nearest candidates as `(point id, distance)`, closest first.
    fn search(&self, vector: &[f32], k: usize, ef: usize) -> StoreResult<Vec<(String, f32)>> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        self.index.change_expansion_search(ef.max(k));
        let matches = self
            .index
            .search(vector, k)
            .map_err(|e| StoreError::ann("search", e))?;

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(label, distance)| {
                self.label_to_id
                    .get(label)
                    .map(|id| (id.clone(), *distance))
            })
            .collect())
    }
}

fn index_options(dim: usize, config: &HnswConfig) -> IndexOptions {
    IndexOptions {
        dimensions: dim,
        metric: match config.space {
            DistanceSpace::Cosine => MetricKind::Cos,
            DistanceSpace::L2 => MetricKind::L2sq,
            DistanceSpace::Ip => MetricKind::IP,
        },
        quantization: ScalarKind::F32,
        connectivity: config.m,
        expansion_add: config.ef_construction,
        expansion_search: config.ef_search,
        multi: false,
    }
}

/// Builds, persists, loads and validates ANN indices for a collection.
#[derive(Debug, Clone)]
pub struct HnswIndexManager {
    config: HnswConfig,
}

impl HnswIndexManager {
    pub fn new(config: HnswConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    #[must_use]
    pub fn index_path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(HNSW_INDEX_FILE)
    }

    #[must_use]
    pub fn index_exists(collection_dir: &Path) -> bool {
        Self::index_path(collection_dir).is_file()
    }

    /// Bulk-build from `vectors`, persist the graph and record it in metadata.
    pub fn build_index(
        &self,
        collection_dir: &Path,
        vectors: &[(String, Vec<f32>)],
        dim: usize,
    ) -> StoreResult<AnnIndex> {
        let mut ann = AnnIndex::create(dim, &self.config, vectors.len())?;
        for (id, vector) in vectors {
            ann.upsert(id, vector)?;
        }
        self.persist(collection_dir, &ann)?;
        tracing::info!(
            vectors = ann.len(),
            dir = %collection_dir.display(),
            "built ANN index"
        );
        Ok(ann)
    }

    /// Load the persisted graph. `None` when the graph file or its metadata
    /// is missing.
    pub fn load_index(&self, collection_dir: &Path) -> StoreResult<Option<AnnIndex>> {
        let Some(metadata) = CollectionMetadata::try_load(collection_dir)? else {
            return Ok(None);
        };
        let Some(hnsw) = metadata.hnsw_index else {
            return Ok(None);
        };
        let path = Self::index_path(collection_dir);
        if !path.is_file() {
            return Ok(None);
        }

        let config = HnswConfig {
            m: hnsw.m,
            ef_construction: hnsw.ef_construction,
            space: hnsw.space,
            ..self.config.clone()
        };
        let index = Index::new(&index_options(hnsw.vector_dim, &config))
            .map_err(|e| StoreError::ann("create index", e))?;
        index
            .load(&path_str(&path)?)
            .map_err(|e| StoreError::corrupted(&path, format!("ANN load failed: {e}")))?;

        let id_to_label = hnsw
            .id_mapping
            .iter()
            .map(|(label, id)| (id.clone(), *label))
            .collect();
        let next_label = hnsw
            .next_label
            .max(hnsw.id_mapping.keys().next_back().map_or(0, |l| l + 1));

        tracing::debug!(vectors = hnsw.id_mapping.len(), "loaded ANN index");
        Ok(Some(AnnIndex {
            index,
            id_to_label,
            label_to_id: hnsw.id_mapping,
            next_label,
            dim: hnsw.vector_dim,
        }))
    }

    /// Candidate ids and distances for `vector`, at most `min(k, len)`.
    pub fn query(
        &self,
        index: &AnnIndex,
        vector: &[f32],
        k: usize,
        ef: Option<usize>,
    ) -> StoreResult<Vec<(String, f32)>> {
        index.search(vector, k, ef.unwrap_or(self.config.ef_search))
    }

    /// Full reconstruction from every point file in the collection.
    pub fn rebuild_from_vectors(&self, collection_dir: &Path) -> StoreResult<AnnIndex> {
        let metadata = CollectionMetadata::load(collection_dir)?;
        let files = scan_point_files(collection_dir);
        let vectors: Vec<(String, Vec<f32>)> = files
            .par_iter()
            .filter_map(|file| match read_record(file) {
                Ok(record) if record.vector.len() == metadata.vector_size => {
                    Some((record.id, record.vector))
                }
                Ok(record) => {
                    tracing::warn!(
                        id = %record.id,
                        expected = metadata.vector_size,
                        actual = record.vector.len(),
                        "skipping point with wrong dimension"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable point record: {e}");
                    None
                }
            })
            .collect();

        self.build_index(collection_dir, &vectors, metadata.vector_size)
    }

    /// Flag the persisted index as out of date.
    pub fn mark_stale(&self, collection_dir: &Path) -> StoreResult<()> {
        CollectionMetadata::update_locked(collection_dir, |metadata| {
            if let Some(hnsw) = metadata.hnsw_index.as_mut() {
                hnsw.is_stale = true;
                hnsw.last_marked_stale = Some(chrono::Utc::now().to_rfc3339());
            }
        })?;
        tracing::debug!(dir = %collection_dir.display(), "marked ANN index stale");
        Ok(())
    }

    /// Whether the persisted index must be rebuilt before use.
    ///
    /// Unreadable metadata counts as stale.
    #[must_use]
    pub fn is_stale(&self, collection_dir: &Path) -> bool {
        let hnsw = match CollectionMetadata::try_load(collection_dir) {
            Ok(Some(metadata)) => metadata.hnsw_index,
            Ok(None) => return true,
            Err(e) => {
                tracing::warn!("treating ANN index as stale, metadata unreadable: {e}");
                return true;
            }
        };
        let Some(hnsw) = hnsw else {
            return true;
        };
        if hnsw.is_stale || !Self::index_exists(collection_dir) {
            return true;
        }

        let on_disk = scan_point_files(collection_dir).len();
        if on_disk != hnsw.vector_count {
            tracing::info!(
                stored = hnsw.vector_count,
                on_disk,
                "ANN index vector count mismatch"
            );
            return true;
        }
        false
    }

    pub fn add_or_update_vector(
        &self,
        index: &mut AnnIndex,
        id: &str,
        vector: &[f32],
    ) -> StoreResult<()> {
        index.upsert(id, vector)
    }

    pub fn remove_vector(&self, index: &mut AnnIndex, id: &str) -> StoreResult<bool> {
        index.remove(id)
    }

    /// Persist an incrementally updated index and clear the stale flag.
    pub fn save_incremental(&self, collection_dir: &Path, index: &AnnIndex) -> StoreResult<()> {
        self.persist(collection_dir, index)
    }

    /// Load, apply `upserts` and `removals`, and persist. Fails with
    /// `IndexNotFound`-style errors when there is nothing to update.
    pub fn apply_changes(
        &self,
        collection_dir: &Path,
        upserts: &[(String, Vec<f32>)],
        removals: &[String],
    ) -> StoreResult<AnnIndex> {
        let mut index = self.load_index(collection_dir)?.ok_or_else(|| {
            StoreError::IndexNotFound {
                collection: collection_name(collection_dir),
            }
        })?;
        for id in removals {
            index.remove(id)?;
        }
        for (id, vector) in upserts {
            index.upsert(id, vector)?;
        }
        self.persist(collection_dir, &index)?;
        Ok(index)
    }

    /// Write the graph atomically, then the metadata sub-document under lock.
    fn persist(&self, collection_dir: &Path, index: &AnnIndex) -> StoreResult<()> {
        let path = Self::index_path(collection_dir);
        let tmp = collection_dir.join(format!(".{HNSW_INDEX_FILE}.tmp"));
        index
            .index
            .save(&path_str(&tmp)?)
            .map_err(|e| StoreError::ann("save index", e))?;
        std::fs::rename(&tmp, &path).with_path(&path)?;
        let file_size_bytes = std::fs::metadata(&path).with_path(&path)?.len();

        let hnsw = HnswMetadata {
            version: HnswMetadata::CURRENT_VERSION,
            vector_count: index.len(),
            vector_dim: index.dim,
            m: self.config.m,
            ef_construction: self.config.ef_construction,
            space: self.config.space,
            last_rebuild: chrono::Utc::now().to_rfc3339(),
            file_size_bytes,
            id_mapping: index.label_to_id.clone(),
            next_label: index.next_label,
            is_stale: false,
            last_marked_stale: None,
        };
        CollectionMetadata::update_locked(collection_dir, move |metadata| {
            metadata.hnsw_index = Some(hnsw);
        })?;
        Ok(())
    }
}

fn path_str(path: &Path) -> StoreResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidArgument {
            reason: format!("path '{}' is not valid UTF-8", path.display()),
        })
}

fn collection_name(collection_dir: &Path) -> String {
    collection_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
