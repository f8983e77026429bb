//! Indexing sessions.
//!
//! `begin_indexing` opens a change set for a collection; batch-mode writes
//! record into it and `end_indexing` uses it to decide between an incremental
//! ANN update, a full rebuild, or nothing at all.

use std::collections::HashSet;
use std::path::Path;

use super::FilesystemVectorStore;
use crate::error::{StoreError, StoreResult};
use crate::index::{AnnIndex, HnswIndexManager};
use crate::storage::{CollectionMetadata, read_record};
use crate::types::{AnnUpdate, IndexingSummary};

/// Point ids touched since `begin_indexing`. The three sets stay disjoint.
#[derive(Debug, Default, Clone)]
pub(crate) struct ChangeSet {
    pub(crate) added: HashSet<String>,
    pub(crate) updated: HashSet<String>,
    pub(crate) deleted: HashSet<String>,
}

impl ChangeSet {
    pub(crate) fn record_upsert(&mut self, id: &str, existed: bool) {
        if self.deleted.remove(id) {
            self.updated.insert(id.to_string());
        } else if !self.added.contains(id) {
            if existed {
                self.updated.insert(id.to_string());
            } else {
                self.added.insert(id.to_string());
            }
        }
    }

    pub(crate) fn record_delete(&mut self, id: &str) {
        let was_added = self.added.remove(id);
        self.updated.remove(id);
        // Added and deleted within one session never reached the ANN index
        if !was_added {
            self.deleted.insert(id.to_string());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FilesystemVectorStore {
    /// Open an indexing session on `name`. Reloads the id and path indices
    /// from disk so writes by other processes are picked up.
    pub fn begin_indexing(&self, name: &str) -> StoreResult<()> {
        let dir = self.collection_dir(name)?;
        self.invalidate_file_list(name);

        self.id_indices.remove(name);
        self.path_indices.remove(name);
        self.id_index(name, &dir)?;
        self.path_index(name, &dir)?;

        self.sessions
            .lock()
            .insert(name.to_string(), ChangeSet::default());
        tracing::debug!(collection = %name, "indexing session started");
        Ok(())
    }

    /// Close the session on `name`, persist the indices and bring the ANN
    /// index up to date (or only mark it stale when `skip_ann_rebuild`).
    pub fn end_indexing(&self, name: &str, skip_ann_rebuild: bool) -> StoreResult<IndexingSummary> {
        let dir = self.collection_dir(name)?;
        self.persist_indices(name, &dir)?;
        let changes = self.sessions.lock().remove(name);

        let ann_update = if skip_ann_rebuild {
            self.hnsw.mark_stale(&dir)?;
            self.install_cached(name, None);
            AnnUpdate::MarkedStale
        } else {
            match changes {
                Some(changes) => self.reconcile_ann(name, &dir, &changes)?,
                None => {
                    tracing::debug!(collection = %name, "end_indexing without session, rebuilding");
                    self.full_rebuild(name, &dir)?
                }
            }
        };

        let unique_files = self.path_index(name, &dir)?.lock().file_count();
        CollectionMetadata::update_locked(&dir, |metadata| {
            metadata.unique_file_count = unique_files;
        })?;
        let vectors = self.id_index(name, &dir)?.lock().len();

        tracing::info!(
            collection = %name,
            vectors,
            unique_files,
            ?ann_update,
            "indexing session finished"
        );
        Ok(IndexingSummary {
            vectors,
            unique_files,
            ann_update,
        })
    }

    fn reconcile_ann(&self, name: &str, dir: &Path, changes: &ChangeSet) -> StoreResult<AnnUpdate> {
        if !HnswIndexManager::index_exists(dir) {
            return self.full_rebuild(name, dir);
        }
        if changes.is_empty() {
            if self.hnsw.is_stale(dir) {
                return self.full_rebuild(name, dir);
            }
            return Ok(AnnUpdate::Unchanged);
        }

        let indexed = match CollectionMetadata::load(dir)?.hnsw_index {
            Some(hnsw) if !hnsw.is_stale => hnsw.vector_count,
            _ => return self.full_rebuild(name, dir),
        };
        let ratio = changes.len() as f64 / indexed.max(1) as f64;
        if ratio > f64::from(self.settings.hnsw.incremental_max_ratio) {
            tracing::info!(
                collection = %name,
                changes = changes.len(),
                indexed,
                "change set too large for incremental update"
            );
            return self.full_rebuild(name, dir);
        }

        let upserts = self.collect_vectors(name, dir, changes.added.iter().chain(&changes.updated))?;
        let removals: Vec<String> = changes.deleted.iter().cloned().collect();
        match self.hnsw.apply_changes(dir, &upserts, &removals) {
            Ok(index) => {
                self.install_cached(name, Some(index));
                Ok(AnnUpdate::Incremental {
                    upserted: upserts.len(),
                    removed: removals.len(),
                })
            }
            Err(e) => {
                tracing::warn!(collection = %name, "incremental ANN update failed, rebuilding: {e}");
                self.full_rebuild(name, dir)
            }
        }
    }

    fn full_rebuild(&self, name: &str, dir: &Path) -> StoreResult<AnnUpdate> {
        let index = self.hnsw.rebuild_from_vectors(dir)?;
        let vectors = index.len();
        self.install_cached(name, Some(index));
        Ok(AnnUpdate::FullRebuild { vectors })
    }

    /// Vectors of `ids` read back from their point records. Ids that no
    /// longer resolve are skipped.
    pub(crate) fn collect_vectors<'a>(
        &self,
        name: &str,
        dir: &Path,
        ids: impl Iterator<Item = &'a String>,
    ) -> StoreResult<Vec<(String, Vec<f32>)>> {
        let locations: Vec<(String, std::path::PathBuf)> = {
            let map = self.id_index(name, dir)?;
            let map = map.lock();
            ids.filter_map(|id| map.get(id).map(|rel| (id.clone(), rel.clone())))
                .collect()
        };

        let mut vectors = Vec::with_capacity(locations.len());
        for (id, relative) in locations {
            match read_record(&dir.join(&relative)) {
                Ok(record) => vectors.push((id, record.vector)),
                Err(StoreError::Io { .. }) => {
                    tracing::debug!(id = %id, "point removed before ANN update");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(vectors)
    }

    /// Load the persisted ANN index, rebuilding it first when stale.
    pub(crate) fn fresh_index(&self, dir: &Path) -> StoreResult<Option<AnnIndex>> {
        if self.hnsw.is_stale(dir) {
            if crate::storage::scan_point_files(dir).is_empty() {
                return Ok(None);
            }
            tracing::info!(dir = %dir.display(), "ANN index stale, rebuilding before query");
            return self.hnsw.rebuild_from_vectors(dir).map(Some);
        }
        self.hnsw.load_index(dir)
    }
}
