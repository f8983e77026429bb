//! Daemon-mode ANN cache.
//!
//! Inside the long-running daemon each collection's ANN index stays loaded.
//! Queries take the read lock; watch-mode updates take the write lock, mutate
//! the graph in place and persist it before releasing. A writer that needs to
//! validate state reads through its own guard instead of re-locking.
//!
//! A query keeps one owned read guard from the moment it finds the index
//! loaded until its ANN lookup is done, so a concurrent writer cannot unload
//! the index in between.

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock, RwLockWriteGuard};
use std::sync::Arc;

use super::FilesystemVectorStore;
use crate::index::AnnIndex;

/// Readers/writer pair around one collection's live ANN index.
#[derive(Debug, Default)]
pub struct CollectionCache {
    index: Arc<RwLock<Option<AnnIndex>>>,
}

/// Read access to a cached index that outlives the borrow of the cache.
pub(crate) type CachedRead = ArcRwLockReadGuard<RawRwLock, Option<AnnIndex>>;

impl CollectionCache {
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Option<AnnIndex>> {
        self.index.write()
    }

    pub(crate) fn read_owned(&self) -> CachedRead {
        self.index.read_arc()
    }

    pub(crate) fn write_owned(&self) -> ArcRwLockWriteGuard<RawRwLock, Option<AnnIndex>> {
        self.index.write_arc()
    }

    /// Whether an index is currently loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.index.read().is_some()
    }

    /// Number of vectors in the loaded index.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        self.index.read().as_ref().map(AnnIndex::len)
    }
}

impl FilesystemVectorStore {
    /// Cache entry of `name`; `None` outside daemon mode.
    pub(crate) fn collection_cache(&self, name: &str) -> Option<Arc<CollectionCache>> {
        let cache = self.daemon_cache.as_ref()?;
        Some(Arc::clone(
            cache
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CollectionCache::default()))
                .value(),
        ))
    }

    /// Replace the cached index of `name` (daemon mode only).
    pub(crate) fn install_cached(&self, name: &str, index: Option<AnnIndex>) {
        if let Some(cache) = self.collection_cache(name) {
            *cache.write() = index;
        }
    }

    /// Public view of the daemon cache for `name`.
    #[must_use]
    pub fn cached_index(&self, name: &str) -> Option<Arc<CollectionCache>> {
        self.daemon_cache
            .as_ref()?
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }
}
