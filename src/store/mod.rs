//! Filesystem vector store.
//!
//! [`FilesystemVectorStore`] owns every per-collection cache of a process
//! and is the only component talking to the version-control and embedding
//! collaborators. One instance is constructed per process (or daemon) and
//! shared by reference.
//!
//! Lock order, outermost first: `sessions`, `path index`, `id index`,
//! `legacy`, `write_lock`. No lock is held across record file I/O except
//! `write_lock`, which exists to serialize those writes.

mod cache;
mod collection;
mod content;
mod scroll;
mod search;
mod session;
mod upsert;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{StoreError, StoreResult};
use crate::git::{GitCli, NoVersionControl, VersionControl};
use crate::index::{CODE_BYTES, HnswIndexManager, IdIndexManager, IdMap, PathIndex, VectorIndexManager};
use crate::storage::{CollectionMetadata, read_record};
use crate::types::PointRecord;
use crate::vector::{ProjectionMatrix, ProjectionMatrixManager, QuantizationMode, VectorQuantizer};

pub use cache::CollectionCache;
use session::ChangeSet;

/// Addressing parameters of a collection, immutable after creation.
#[derive(Debug)]
pub(crate) struct CollectionLayout {
    pub(crate) dir: PathBuf,
    pub(crate) vector_size: usize,
    pub(crate) mode: QuantizationMode,
    pub(crate) quantizer: VectorQuantizer,
    pub(crate) matrix: Arc<ProjectionMatrix>,
}

impl CollectionLayout {
    /// Quantized hex code and the record path (relative to the collection)
    /// for a point.
    pub(crate) fn locate(&self, id: &str, vector: &[f32]) -> StoreResult<(String, PathBuf)> {
        let hex = self.quantizer.quantize_vector(vector, &self.matrix, self.mode)?;
        let mut relative: PathBuf = self.quantizer.path_segments(&hex).iter().collect();
        relative.push(crate::storage::point_file_name(id));
        Ok((hex, relative))
    }
}

/// Embedded vector store rooted at one index directory.
pub struct FilesystemVectorStore {
    base_path: PathBuf,
    settings: Settings,
    hnsw: HnswIndexManager,
    vcs: Arc<dyn VersionControl>,
    /// Serializes record file writes
    write_lock: Mutex<()>,
    /// Addressing parameters per collection
    metadata_cache: Mutex<HashMap<String, Arc<CollectionLayout>>>,
    id_indices: DashMap<String, Arc<Mutex<IdMap>>>,
    path_indices: DashMap<String, Arc<Mutex<PathIndex>>>,
    legacy_indices: DashMap<String, Arc<Mutex<VectorIndexManager>>>,
    /// Active indexing sessions
    sessions: Mutex<HashMap<String, ChangeSet>>,
    /// Sorted relative record paths, invalidated on every mutation
    file_lists: Mutex<HashMap<String, Arc<Vec<String>>>>,
    /// Live ANN indices when running inside the daemon
    daemon_cache: Option<DashMap<String, Arc<CollectionCache>>>,
}

impl std::fmt::Debug for FilesystemVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemVectorStore")
            .field("base_path", &self.base_path)
            .field("daemon_cache", &self.daemon_cache.is_some())
            .finish()
    }
}

impl FilesystemVectorStore {
    /// Store rooted at `base_path`. Git integration follows `settings.git`.
    pub fn new(base_path: impl Into<PathBuf>, settings: &Settings) -> StoreResult<Self> {
        let base_path = base_path.into();

        // Validate storage settings once, up front
        VectorQuantizer::new(settings.storage.depth_factor, settings.storage.reduced_dim)?;
        if settings.storage.legacy_index && settings.storage.reduced_dim != CODE_BYTES * 4 {
            return Err(StoreError::Config {
                reason: format!(
                    "legacy_index requires reduced_dim = {}, got {}",
                    CODE_BYTES * 4,
                    settings.storage.reduced_dim
                ),
            });
        }

        let vcs: Arc<dyn VersionControl> = if settings.git.enabled {
            let start = settings
                .workspace_root
                .clone()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| base_path.clone());
            Arc::new(GitCli::discover(&start, &settings.git))
        } else {
            Arc::new(NoVersionControl)
        };

        Ok(Self {
            base_path,
            settings: settings.clone(),
            hnsw: HnswIndexManager::new(settings.hnsw.clone()),
            vcs,
            write_lock: Mutex::new(()),
            metadata_cache: Mutex::new(HashMap::new()),
            id_indices: DashMap::new(),
            path_indices: DashMap::new(),
            legacy_indices: DashMap::new(),
            sessions: Mutex::new(HashMap::new()),
            file_lists: Mutex::new(HashMap::new()),
            daemon_cache: None,
        })
    }

    /// Store at the index path configured in `settings`.
    pub fn open(settings: &Settings) -> StoreResult<Self> {
        Self::new(settings.resolved_index_path(), settings)
    }

    /// Replace the version-control collaborator.
    #[must_use]
    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = vcs;
        self
    }

    /// Keep live ANN indices in memory and mutate them in place.
    #[must_use]
    pub fn with_daemon_cache(mut self) -> Self {
        self.daemon_cache = Some(DashMap::new());
        self
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn validate_name(name: &str) -> StoreResult<()> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && name != "..";
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidArgument {
                reason: format!("'{name}' is not a valid collection name"),
            })
        }
    }

    /// Directory of `name`, which must exist.
    pub(crate) fn collection_dir(&self, name: &str) -> StoreResult<PathBuf> {
        Self::validate_name(name)?;
        let dir = self.base_path.join(name);
        if !CollectionMetadata::exists(&dir) {
            return Err(StoreError::CollectionNotFound {
                name: name.to_string(),
            });
        }
        Ok(dir)
    }

    pub(crate) fn layout(&self, name: &str) -> StoreResult<Arc<CollectionLayout>> {
        if let Some(layout) = self.metadata_cache.lock().get(name) {
            return Ok(Arc::clone(layout));
        }

        let dir = self.collection_dir(name)?;
        let metadata = CollectionMetadata::load(&dir)?;
        let matrix = ProjectionMatrixManager::load_matrix(&dir)?;
        if matrix.input_dim() != metadata.vector_size || matrix.output_dim() != metadata.reduced_dim
        {
            return Err(StoreError::corrupted(
                &ProjectionMatrixManager::matrix_path(&dir),
                format!(
                    "matrix is {}x{}, metadata expects {}x{}",
                    matrix.input_dim(),
                    matrix.output_dim(),
                    metadata.vector_size,
                    metadata.reduced_dim
                ),
            ));
        }

        let layout = Arc::new(CollectionLayout {
            vector_size: metadata.vector_size,
            mode: QuantizationMode::from_strategy(metadata.quantization, metadata.range()),
            quantizer: VectorQuantizer::new(metadata.depth_factor, metadata.reduced_dim)?,
            matrix: Arc::new(matrix),
            dir,
        });
        self.metadata_cache
            .lock()
            .insert(name.to_string(), Arc::clone(&layout));
        Ok(layout)
    }

    pub(crate) fn id_index(&self, name: &str, dir: &Path) -> StoreResult<Arc<Mutex<IdMap>>> {
        if let Some(index) = self.id_indices.get(name) {
            return Ok(Arc::clone(index.value()));
        }
        let map = IdIndexManager::load_or_rebuild(dir)?;
        Ok(Arc::clone(
            self.id_indices
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(map)))
                .value(),
        ))
    }

    pub(crate) fn path_index(&self, name: &str, dir: &Path) -> StoreResult<Arc<Mutex<PathIndex>>> {
        if let Some(index) = self.path_indices.get(name) {
            return Ok(Arc::clone(index.value()));
        }
        let index = self.load_path_index(name, dir)?;
        Ok(Arc::clone(
            self.path_indices
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(index)))
                .value(),
        ))
    }

    /// Load the path index from disk, rebuilding it from records when the
    /// file is missing but points exist.
    fn load_path_index(&self, name: &str, dir: &Path) -> StoreResult<PathIndex> {
        if PathIndex::file_path(dir).is_file() {
            return PathIndex::load(dir);
        }

        let ids = self.id_index(name, dir)?;
        let locations: Vec<PathBuf> = ids.lock().values().cloned().collect();
        if locations.is_empty() {
            return Ok(PathIndex::new());
        }

        let mut index = PathIndex::new();
        for relative in locations {
            match read_record(&dir.join(&relative)) {
                Ok(record) => {
                    if let Some(path) = cleanup_path(&record) {
                        index.add_point(path, &record.id);
                    }
                }
                Err(e) => tracing::warn!("skipping unreadable point record: {e}"),
            }
        }
        tracing::info!(
            collection = %name,
            files = index.file_count(),
            "rebuilt path index from point records"
        );
        Ok(index)
    }

    pub(crate) fn legacy_index(
        &self,
        name: &str,
        dir: &Path,
    ) -> StoreResult<Option<Arc<Mutex<VectorIndexManager>>>> {
        if !self.settings.storage.legacy_index {
            return Ok(None);
        }
        if let Some(index) = self.legacy_indices.get(name) {
            return Ok(Some(Arc::clone(index.value())));
        }
        let index = VectorIndexManager::load(dir)?;
        Ok(Some(Arc::clone(
            self.legacy_indices
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(index)))
                .value(),
        )))
    }

    /// Persist id and path indices from snapshots taken under their locks.
    pub(crate) fn persist_indices(&self, name: &str, dir: &Path) -> StoreResult<()> {
        let ids = self.id_index(name, dir)?.lock().clone();
        IdIndexManager::save_index(dir, &ids)?;
        let paths = self.path_index(name, dir)?.lock().clone();
        paths.save(dir)?;
        if let Some(legacy) = self.legacy_index(name, dir)? {
            let snapshot = legacy.lock().clone();
            snapshot.save(dir)?;
        }
        Ok(())
    }

    pub(crate) fn invalidate_file_list(&self, name: &str) {
        self.file_lists.lock().remove(name);
    }

    /// Drop every cached structure of `name`.
    pub(crate) fn forget_collection(&self, name: &str) {
        self.metadata_cache.lock().remove(name);
        self.id_indices.remove(name);
        self.path_indices.remove(name);
        self.legacy_indices.remove(name);
        self.sessions.lock().remove(name);
        self.invalidate_file_list(name);
        if let Some(cache) = &self.daemon_cache {
            cache.remove(name);
        }
    }

    pub(crate) fn track_changes<F>(&self, name: &str, record: F)
    where
        F: FnOnce(&mut ChangeSet),
    {
        if let Some(changes) = self.sessions.lock().get_mut(name) {
            record(changes);
        }
    }
}

/// Source path a record is registered under for duplicate cleanup. Only
/// working-tree chunks participate; historical records of the same path must
/// not evict each other.
pub(crate) fn cleanup_path(record: &PointRecord) -> Option<&str> {
    match record.kind() {
        crate::types::ChunkKind::Content => record.file_path.as_deref(),
        _ => None,
    }
}

/// The persisted index carries the stale flag, or there is none yet.
pub(crate) fn marked_stale(dir: &Path) -> StoreResult<bool> {
    Ok(CollectionMetadata::try_load(dir)?
        .and_then(|metadata| metadata.hnsw_index)
        .is_none_or(|hnsw| hnsw.is_stale))
}
