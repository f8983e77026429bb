//! Query path.
//!
//! The ANN index only nominates candidates. Final ranking uses the exact
//! cosine similarity between the query and each candidate's stored vector,
//! after which payload filters and the score threshold apply.

use rayon::prelude::*;
use std::path::Path;

use parking_lot::ArcRwLockWriteGuard;

use super::{FilesystemVectorStore, marked_stale};
use super::cache::CachedRead;
use crate::embedding::EmbeddingProvider;
use crate::error::{StoreError, StoreResult};
use crate::index::AnnIndex;
use crate::storage::{read_record, scan_point_files};
use crate::types::{SearchHit, SearchParams, StoredPoint};
use crate::vector::{VectorDimension, cosine_similarity};

/// ANN index ready to answer a query.
enum Candidates {
    /// Daemon cache, read-locked until the query is done
    Cached(CachedRead),
    Owned(AnnIndex),
    /// Collection without points
    Empty,
}

impl FilesystemVectorStore {
    /// Embed `query` and search `name` with it.
    ///
    /// Embedding generation and index preparation run concurrently.
    pub fn search(
        &self,
        name: &str,
        query: &str,
        provider: &dyn EmbeddingProvider,
        params: &SearchParams,
    ) -> StoreResult<Vec<SearchHit>> {
        let dir = self.collection_dir(name)?;
        let (embedding, candidates) = rayon::join(
            || provider.embed(query),
            || self.prepare_candidates(name, &dir),
        );
        let embedding = embedding?;
        let candidates = candidates?;
        tracing::debug!(
            collection = %name,
            model = provider.model_name(),
            "query embedded"
        );
        self.search_prepared(name, &dir, &embedding, candidates, params)
    }

    /// Search `name` with a precomputed query vector.
    pub fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        params: &SearchParams,
    ) -> StoreResult<Vec<SearchHit>> {
        let dir = self.collection_dir(name)?;
        let candidates = self.prepare_candidates(name, &dir)?;
        self.search_prepared(name, &dir, vector, candidates, params)
    }

    fn prepare_candidates(&self, name: &str, dir: &Path) -> StoreResult<Candidates> {
        // Warm the id index alongside the ANN index
        self.id_index(name, dir)?;

        let Some(cache) = self.collection_cache(name) else {
            return Ok(match self.fresh_index(dir)? {
                Some(index) => Candidates::Owned(index),
                None => Candidates::Empty,
            });
        };

        if !marked_stale(dir)? {
            let guard = cache.read_owned();
            if guard.is_some() {
                return Ok(Candidates::Cached(guard));
            }
        }

        let mut guard = cache.write_owned();
        // Another query may have loaded or rebuilt it while we waited
        if guard.is_none() || marked_stale(dir)? {
            *guard = self.fresh_index(dir)?;
        }
        if guard.is_none() {
            return Ok(Candidates::Empty);
        }
        Ok(Candidates::Cached(ArcRwLockWriteGuard::downgrade(guard)))
    }

    fn search_prepared(
        &self,
        name: &str,
        dir: &Path,
        vector: &[f32],
        candidates: Candidates,
        params: &SearchParams,
    ) -> StoreResult<Vec<SearchHit>> {
        let layout = self.layout(name)?;
        VectorDimension::new(layout.vector_size)?.validate_vector("<query>", vector)?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let prefetch = params
            .prefetch
            .unwrap_or(self.settings.search.prefetch_limit);
        let k = (params.limit * 2).max(prefetch);

        let nominated = match &candidates {
            Candidates::Owned(index) => self.hnsw.query(index, vector, k, params.ef)?,
            Candidates::Cached(guard) => match (**guard).as_ref() {
                Some(index) => self.hnsw.query(index, vector, k, params.ef)?,
                None => return Err(self.missing_index(name, dir)),
            },
            Candidates::Empty if scan_point_files(dir).is_empty() => return Ok(Vec::new()),
            Candidates::Empty => return Err(self.missing_index(name, dir)),
        };

        drop(candidates);

        let locations: Vec<(String, std::path::PathBuf)> = {
            let ids = self.id_index(name, dir)?;
            let ids = ids.lock();
            nominated
                .into_iter()
                .filter_map(|(id, _)| ids.get(&id).map(|rel| (id, rel.clone())))
                .collect()
        };

        let threshold = params
            .score_threshold
            .or(self.settings.search.score_threshold);
        let mut scored: Vec<(f32, crate::types::PointRecord)> = locations
            .par_iter()
            .filter_map(|(id, relative)| match read_record(&dir.join(relative)) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(id = %id, "skipping candidate: {e}");
                    None
                }
            })
            .filter(|record| {
                params
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(&record.payload))
            })
            .map(|record| (cosine_similarity(vector, &record.vector), record))
            .filter(|(score, _)| threshold.is_none_or(|t| *score >= t))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(params.limit);

        Ok(scored
            .into_iter()
            .map(|(score, record)| {
                let content = if params.skip_content {
                    None
                } else {
                    self.resolve_content(&record)
                };
                SearchHit {
                    id: record.id,
                    score,
                    payload: record.payload,
                    content,
                }
            })
            .collect())
    }

    fn missing_index(&self, name: &str, dir: &Path) -> StoreError {
        tracing::warn!(dir = %dir.display(), "points present but no ANN index could be loaded");
        StoreError::IndexNotFound {
            collection: name.to_string(),
        }
    }

    /// Fetch one point by id with its resolved content.
    pub fn get_point(&self, name: &str, id: &str) -> StoreResult<Option<StoredPoint>> {
        let dir = self.collection_dir(name)?;
        let Some(relative) = self.id_index(name, &dir)?.lock().get(id).cloned() else {
            return Ok(None);
        };
        let record = match read_record(&dir.join(relative)) {
            Ok(record) => record,
            Err(StoreError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!(id = %id, "id index points at a missing record");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let content = self.resolve_content(&record);
        Ok(Some(StoredPoint {
            id: record.id,
            vector: record.vector,
            payload: record.payload,
            content,
        }))
    }
}
