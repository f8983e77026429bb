//! Collection lifecycle and inventory operations.

use std::fs;
use std::path::Path;

use super::FilesystemVectorStore;
use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::{CollectionMetadata, write_atomic};
use crate::types::{AnnSummary, CollectionInfo, HealthReport};
use crate::vector::{ProjectionMatrixManager, VectorDimension, analytic_range};

const HEALTH_PROBE_FILE: &str = ".health_probe";

impl FilesystemVectorStore {
    /// Create a collection. Returns `false` when it already exists.
    pub fn create_collection(&self, name: &str, vector_size: usize) -> StoreResult<bool> {
        Self::validate_name(name)?;
        let dimension = VectorDimension::new(vector_size)?;
        let dir = self.base_path.join(name);
        if CollectionMetadata::exists(&dir) {
            tracing::debug!(collection = %name, "collection already exists");
            return Ok(false);
        }

        fs::create_dir_all(&dir).with_path(&dir)?;
        self.ensure_vcs_excluded()?;

        let storage = &self.settings.storage;
        let matrix =
            ProjectionMatrixManager::create_projection_matrix(dimension.get(), storage.reduced_dim)?;
        ProjectionMatrixManager::save_matrix(&dir, &matrix)?;

        let range = analytic_range(dimension.get(), storage.reduced_dim);
        CollectionMetadata::new(
            name,
            dimension.get(),
            storage.reduced_dim,
            storage.depth_factor,
            storage.quantization,
            range,
        )
        .save(&dir)?;

        self.forget_collection(name);
        tracing::info!(
            collection = %name,
            vector_size,
            range_min = range.0,
            range_max = range.1,
            "created collection"
        );
        Ok(true)
    }

    /// Keep the index tree out of any enclosing git checkout.
    fn ensure_vcs_excluded(&self) -> StoreResult<()> {
        let gitignore = self.base_path.join(".gitignore");
        if !gitignore.exists() {
            write_atomic(&gitignore, b"*\n")?;
        }
        Ok(())
    }

    #[must_use]
    pub fn collection_exists(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok() && CollectionMetadata::exists(&self.base_path.join(name))
    }

    /// Names of all collections, sorted.
    pub fn list_collections(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_path(&self.base_path),
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| CollectionMetadata::exists(&entry.path()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove a collection and its whole directory tree.
    pub fn delete_collection(&self, name: &str) -> StoreResult<bool> {
        Self::validate_name(name)?;
        let dir = self.base_path.join(name);
        self.forget_collection(name);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).with_path(&dir)?;
        tracing::info!(collection = %name, "deleted collection");
        Ok(true)
    }

    /// Number of live points.
    pub fn count_points(&self, name: &str) -> StoreResult<usize> {
        let dir = self.collection_dir(name)?;
        Ok(self.id_index(name, &dir)?.lock().len())
    }

    /// Distinct source files with indexed chunks, sorted.
    pub fn get_all_indexed_files(&self, name: &str) -> StoreResult<Vec<String>> {
        let dir = self.collection_dir(name)?;
        Ok(self.path_index(name, &dir)?.lock().paths())
    }

    pub fn collection_info(&self, name: &str) -> StoreResult<CollectionInfo> {
        let dir = self.collection_dir(name)?;
        let metadata = CollectionMetadata::load(&dir)?;
        let point_count = self.count_points(name)?;
        let stale = self.hnsw.is_stale(&dir);

        Ok(CollectionInfo {
            name: metadata.name,
            vector_size: metadata.vector_size,
            point_count,
            unique_file_count: metadata.unique_file_count,
            created_at: metadata.created_at,
            stale,
            ann: metadata.hnsw_index.map(|hnsw| AnnSummary {
                vector_count: hnsw.vector_count,
                m: hnsw.m,
                ef_construction: hnsw.ef_construction,
                space: hnsw.space,
                last_rebuild: hnsw.last_rebuild,
                file_size_bytes: hnsw.file_size_bytes,
            }),
        })
    }

    /// Whether the ANN index of `name` needs a rebuild.
    pub fn is_index_stale(&self, name: &str) -> StoreResult<bool> {
        let dir = self.collection_dir(name)?;
        Ok(self.hnsw.is_stale(&dir))
    }

    /// Probe that the index directory is reachable and writable.
    #[must_use]
    pub fn health_check(&self) -> HealthReport {
        let reachable = fs::create_dir_all(&self.base_path).is_ok() && self.base_path.is_dir();
        let writable = reachable && probe_write(&self.base_path);
        let collections = self.list_collections().map(|c| c.len()).unwrap_or(0);

        if !writable {
            tracing::warn!(path = %self.base_path.display(), reachable, "index directory is not writable");
        }
        HealthReport {
            index_path: self.base_path.display().to_string(),
            reachable,
            writable,
            collections,
        }
    }

    /// Full ANN rebuild from the point files; returns the indexed count.
    pub fn rebuild_index(&self, name: &str) -> StoreResult<usize> {
        let dir = self.collection_dir(name)?;
        let index = self.hnsw.rebuild_from_vectors(&dir)?;
        let count = index.len();
        self.install_cached(name, Some(index));
        Ok(count)
    }

    /// Hamming-distance candidates from the legacy code index, closest
    /// first. Only available with `storage.legacy_index`.
    pub fn legacy_candidates(
        &self,
        name: &str,
        vector: &[f32],
        max_distance: u32,
        limit: usize,
    ) -> StoreResult<Vec<(String, u32)>> {
        let layout = self.layout(name)?;
        let Some(legacy) = self.legacy_index(name, &layout.dir)? else {
            return Err(StoreError::Config {
                reason: "legacy index is disabled (storage.legacy_index = false)".to_string(),
            });
        };
        VectorDimension::new(layout.vector_size)?.validate_vector("<query>", vector)?;
        let hex = layout
            .quantizer
            .quantize_vector(vector, &layout.matrix, layout.mode)?;
        legacy.lock().find_candidates(&hex, max_distance, limit)
    }
}

fn probe_write(dir: &Path) -> bool {
    let probe = dir.join(format!("{HEALTH_PROBE_FILE}_{}", std::process::id()));
    let ok = fs::write(&probe, b"ok").is_ok();
    let _ = fs::remove_file(&probe);
    ok
}
