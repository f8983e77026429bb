//! Error types for the filesystem vector store
//!
//! This module provides structured error types using thiserror. Variants map to
//! the failure classes the store distinguishes: corruption, configuration,
//! internal invariant violations, and plain I/O. Degraded-but-safe conditions
//! (version control unavailable, missing ANN metadata) never surface here; they
//! resolve to documented defaults at the call site.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::filter::FilterError;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// File system errors
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Collection '{name}' does not exist. Create it with create_collection first")]
    CollectionNotFound { name: String },

    #[error("Collection metadata missing at '{path}'. The collection directory is incomplete")]
    MetadataNotFound { path: PathBuf },

    #[error(
        "Projection matrix not found at '{path}'. Refusing to regenerate silently because derived paths would no longer match"
    )]
    ProjectionMatrixNotFound { path: PathBuf },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Corruption errors
    #[error("Index file '{path}' is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Vector dimension mismatch for '{id}': expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to (de)serialize '{path}': {reason}")]
    Serialization { path: PathBuf, reason: String },

    /// Search path errors
    #[error("ANN index not found for collection '{collection}', rebuild required")]
    IndexNotFound { collection: String },

    #[error("ANN operation failed during {operation}: {cause}")]
    Ann { operation: String, cause: String },

    /// Internal invariant violations
    #[error("Internal invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("Failed to acquire advisory lock on '{path}': {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl StoreError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Io { .. } => "IO_ERROR",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::MetadataNotFound { .. } => "METADATA_NOT_FOUND",
            Self::ProjectionMatrixNotFound { .. } => "PROJECTION_MATRIX_NOT_FOUND",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Corrupted { .. } => "INDEX_CORRUPTED",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::Ann { .. } => "ANN_ERROR",
            Self::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            Self::Lock { .. } => "LOCK_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Filter(_) => "INVALID_FILTER",
            Self::Embedding(_) => "EMBEDDING_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Corrupted { .. } => vec![
                "Run 'codevec rebuild <collection>' to regenerate the ANN index",
                "Delete the corrupted index file; the id index is rebuilt from point files on next load",
            ],
            Self::IndexNotFound { .. } => vec![
                "Run 'codevec rebuild <collection>' to build the ANN index",
                "Finish the indexing session with end_indexing to persist the index",
            ],
            Self::ProjectionMatrixNotFound { .. } | Self::MetadataNotFound { .. } => vec![
                "The collection directory is incomplete; recreate the collection and reindex",
            ],
            Self::CollectionNotFound { .. } => vec!["Run 'codevec create <name> <dimension>'"],
            Self::DimensionMismatch { .. } => {
                vec!["Ensure all vectors are produced by the same embedding model"]
            }
            Self::Lock { .. } => vec![
                "Another process may hold the collection lock; retry once it finishes",
                "Check file permissions in the collection directory",
            ],
            Self::Io { .. } => vec!["Check disk space and file permissions"],
            Self::InvariantViolation { .. } => {
                vec!["This indicates a bug in the indexing pipeline; please report it"]
            }
            _ => vec![],
        }
    }

    /// Shorthand for a corruption error on `path`.
    pub fn corrupted(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn ann(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Ann {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Helper trait for attaching a path to I/O errors
pub trait IoContext<T> {
    fn with_path(self, path: &Path) -> StoreResult<T>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &Path) -> StoreResult<T> {
        self.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
