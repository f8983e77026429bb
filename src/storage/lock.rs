//! Advisory cross-process locking.
//!
//! A background daemon and ad-hoc CLI processes may both touch a collection's
//! metadata. Mutations take an exclusive OS file lock on `.metadata.lock`;
//! the lock is released when the guard drops.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};

pub const METADATA_LOCK_FILE: &str = ".metadata.lock";

/// Guard holding an OS advisory lock.
#[derive(Debug)]
pub struct MetadataLock {
    file: File,
    path: PathBuf,
}

impl MetadataLock {
    /// Block until the exclusive lock for `collection_dir` is held.
    pub fn exclusive(collection_dir: &Path) -> StoreResult<Self> {
        let (file, path) = Self::open(collection_dir)?;
        file.lock().map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "acquired exclusive metadata lock");
        Ok(Self { file, path })
    }

    /// Block until a shared lock for `collection_dir` is held.
    pub fn shared(collection_dir: &Path) -> StoreResult<Self> {
        let (file, path) = Self::open(collection_dir)?;
        file.lock_shared().map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;
        Ok(Self { file, path })
    }

    fn open(collection_dir: &Path) -> StoreResult<(File, PathBuf)> {
        let path = collection_dir.join(METADATA_LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_path(&path)?;
        Ok((file, path))
    }
}

impl Drop for MetadataLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), "failed to release metadata lock: {e}");
        }
    }
}
