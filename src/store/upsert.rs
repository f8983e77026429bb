//! Point writes and deletes.
//!
//! Re-indexing a file replaces all of its chunks: before the new points are
//! written, every point previously registered under the same source path and
//! absent from the batch is removed, so chunk counts can shrink without
//! leaving orphans behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{FilesystemVectorStore, cleanup_path, marked_stale};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::{read_record, write_record};
use crate::types::{ChunkKind, PointRecord, UpsertSummary, VectorPoint, WriteMode};
use crate::vector::VectorDimension;

/// A record ready to be written, with its quantized location.
struct PreparedPoint {
    record: PointRecord,
    hex: String,
    relative: PathBuf,
}

fn remove_file_if_present(path: &Path) -> StoreResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_path(path),
    }
}

impl FilesystemVectorStore {
    /// Write `points` into `name`.
    ///
    /// Every point is validated and converted before the first file is
    /// touched, so a bad point fails the batch without partial writes. In
    /// [`WriteMode::Watch`] the ANN index is updated before returning;
    /// otherwise the change is recorded for `end_indexing`.
    pub fn upsert_points(
        &self,
        name: &str,
        points: Vec<VectorPoint>,
        mode: WriteMode,
    ) -> StoreResult<UpsertSummary> {
        let layout = self.layout(name)?;
        let dir = layout.dir.clone();
        let dimension = VectorDimension::new(layout.vector_size)?;

        for point in &points {
            if point.id.is_empty() {
                return Err(StoreError::InvalidArgument {
                    reason: "point id cannot be empty".to_string(),
                });
            }
            dimension.validate_vector(&point.id, &point.vector)?;
        }
        if points.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let git = self.git_snapshot(&points);
        let prepared = points
            .iter()
            .map(|point| {
                let record = self.build_record(point, &git)?;
                let (hex, relative) = layout.locate(&point.id, &point.vector)?;
                Ok(PreparedPoint {
                    record,
                    hex,
                    relative,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let removed = self.remove_superseded_chunks(name, &dir, &points)?;

        let mut upserted = Vec::with_capacity(prepared.len());
        for point in prepared {
            self.write_point(name, &dir, point, &mut upserted)?;
        }
        self.invalidate_file_list(name);

        tracing::debug!(
            collection = %name,
            upserted = upserted.len(),
            removed_orphans = removed.len(),
            "upserted points"
        );
        let summary = UpsertSummary {
            upserted: upserted.len(),
            removed_orphans: removed.len(),
        };
        self.finish_write(name, &dir, mode, &upserted, &removed)?;
        Ok(summary)
    }

    /// Remove points of every re-indexed source file that the incoming batch
    /// does not carry again. Returns the removed ids.
    fn remove_superseded_chunks(
        &self,
        name: &str,
        dir: &Path,
        points: &[VectorPoint],
    ) -> StoreResult<Vec<String>> {
        let incoming: HashSet<&str> = points.iter().map(|p| p.id.as_str()).collect();
        let paths: HashSet<&str> = points
            .iter()
            .filter(|p| p.kind() == ChunkKind::Content)
            .filter_map(VectorPoint::file_path)
            .collect();
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let orphans: Vec<(String, String)> = {
            let index = self.path_index(name, dir)?;
            let index = index.lock();
            paths
                .iter()
                .flat_map(|path| {
                    index
                        .get_point_ids(path)
                        .into_iter()
                        .filter(|id| !incoming.contains(id.as_str()))
                        .map(|id| (path.to_string(), id))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        if orphans.is_empty() {
            return Ok(Vec::new());
        }

        let files: Vec<(String, Option<PathBuf>)> = {
            let ids = self.id_index(name, dir)?;
            let ids = ids.lock();
            orphans
                .iter()
                .map(|(_, id)| (id.clone(), ids.get(id).cloned()))
                .collect()
        };

        {
            let _guard = self.write_lock.lock();
            for relative in files.iter().filter_map(|(_, rel)| rel.as_ref()) {
                remove_file_if_present(&dir.join(relative))?;
            }
        }

        {
            let paths = self.path_index(name, dir)?;
            let mut paths = paths.lock();
            for (path, id) in &orphans {
                paths.remove_point(path, id);
            }
        }
        {
            let ids = self.id_index(name, dir)?;
            let mut ids = ids.lock();
            for (_, id) in &orphans {
                ids.remove(id);
            }
        }
        if let Some(legacy) = self.legacy_index(name, dir)? {
            let mut legacy = legacy.lock();
            for (_, id) in &orphans {
                legacy.remove_entry(id);
            }
        }

        let removed: Vec<String> = orphans.into_iter().map(|(_, id)| id).collect();
        self.track_changes(name, |changes| {
            for id in &removed {
                changes.record_delete(id);
            }
        });
        Ok(removed)
    }

    fn write_point(
        &self,
        name: &str,
        dir: &Path,
        point: PreparedPoint,
        upserted: &mut Vec<(String, Vec<f32>)>,
    ) -> StoreResult<()> {
        let PreparedPoint {
            record,
            hex,
            relative,
        } = point;

        let previous = self.id_index(name, dir)?.lock().get(&record.id).cloned();
        let previous_path = previous
            .as_ref()
            .and_then(|rel| read_record(&dir.join(rel)).ok())
            .and_then(|old| cleanup_path(&old).map(str::to_string));

        {
            let _guard = self.write_lock.lock();
            write_record(&dir.join(&relative), &record)?;
            if let Some(old) = previous.as_ref().filter(|old| **old != relative) {
                tracing::trace!(id = %record.id, "point relocated");
                remove_file_if_present(&dir.join(old))?;
            }
        }

        let current_path = cleanup_path(&record).map(str::to_string);
        {
            let paths = self.path_index(name, dir)?;
            let mut paths = paths.lock();
            if let Some(old) = previous_path.as_deref()
                && current_path.as_deref() != Some(old)
            {
                paths.remove_point(old, &record.id);
            }
            if let Some(path) = current_path.as_deref() {
                paths.add_point(path, &record.id);
            }
        }
        self.id_index(name, dir)?
            .lock()
            .insert(record.id.clone(), relative);
        if let Some(legacy) = self.legacy_index(name, dir)? {
            legacy.lock().add_entry(&record.id, &hex)?;
        }

        let existed = previous.is_some();
        self.track_changes(name, |changes| changes.record_upsert(&record.id, existed));
        upserted.push((record.id, record.vector));
        Ok(())
    }

    /// Delete points by id. Unknown ids are ignored; returns how many were
    /// removed.
    pub fn delete_points(&self, name: &str, ids: &[String], mode: WriteMode) -> StoreResult<usize> {
        let dir = self.collection_dir(name)?;

        let removed: Vec<(String, PathBuf)> = {
            let map = self.id_index(name, &dir)?;
            let mut map = map.lock();
            ids.iter()
                .filter_map(|id| map.remove(id).map(|rel| (id.clone(), rel)))
                .collect()
        };
        if removed.is_empty() {
            return Ok(0);
        }

        let mut source_paths = Vec::with_capacity(removed.len());
        {
            let _guard = self.write_lock.lock();
            for (id, relative) in &removed {
                let file = dir.join(relative);
                if let Ok(record) = read_record(&file)
                    && let Some(path) = cleanup_path(&record)
                {
                    source_paths.push((path.to_string(), id.clone()));
                }
                remove_file_if_present(&file)?;
            }
        }

        {
            let paths = self.path_index(name, &dir)?;
            let mut paths = paths.lock();
            for (path, id) in &source_paths {
                paths.remove_point(path, id);
            }
        }
        if let Some(legacy) = self.legacy_index(name, &dir)? {
            let mut legacy = legacy.lock();
            for (id, _) in &removed {
                legacy.remove_entry(id);
            }
        }

        let removed_ids: Vec<String> = removed.into_iter().map(|(id, _)| id).collect();
        self.track_changes(name, |changes| {
            for id in &removed_ids {
                changes.record_delete(id);
            }
        });
        self.invalidate_file_list(name);
        tracing::debug!(collection = %name, deleted = removed_ids.len(), "deleted points");

        self.finish_write(name, &dir, mode, &[], &removed_ids)?;
        Ok(removed_ids.len())
    }

    /// Propagate a completed write to the ANN index and the persisted
    /// indices. Writes inside an indexing session are left to `end_indexing`.
    fn finish_write(
        &self,
        name: &str,
        dir: &Path,
        mode: WriteMode,
        upserts: &[(String, Vec<f32>)],
        removals: &[String],
    ) -> StoreResult<()> {
        match mode {
            WriteMode::Watch => {
                self.apply_watch_update(name, dir, upserts, removals)?;
                self.persist_indices(name, dir)
            }
            WriteMode::Batch if self.sessions.lock().contains_key(name) => Ok(()),
            WriteMode::Batch => {
                self.persist_indices(name, dir)?;
                self.hnsw.mark_stale(dir)?;
                self.install_cached(name, None);
                Ok(())
            }
        }
    }

    /// Apply one watch-mode change to the ANN index, in place when the
    /// daemon holds it in memory.
    fn apply_watch_update(
        &self,
        name: &str,
        dir: &Path,
        upserts: &[(String, Vec<f32>)],
        removals: &[String],
    ) -> StoreResult<()> {
        if let Some(cache) = self.collection_cache(name) {
            let mut guard = cache.write();
            if guard.is_none() && !marked_stale(dir)? {
                *guard = self.hnsw.load_index(dir)?;
            }
            match guard.as_mut() {
                Some(index) => {
                    for id in removals {
                        self.hnsw.remove_vector(index, id)?;
                    }
                    for (id, vector) in upserts {
                        self.hnsw.add_or_update_vector(index, id, vector)?;
                    }
                    self.hnsw.save_incremental(dir, index)?;
                }
                None => *guard = Some(self.hnsw.rebuild_from_vectors(dir)?),
            }
            return Ok(());
        }

        if marked_stale(dir)? {
            self.hnsw.rebuild_from_vectors(dir)?;
            return Ok(());
        }
        match self.hnsw.apply_changes(dir, upserts, removals) {
            Ok(_) => Ok(()),
            Err(StoreError::IndexNotFound { .. }) => {
                self.hnsw.rebuild_from_vectors(dir)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
