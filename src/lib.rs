//! Embedded filesystem vector store for semantic code search.
//!
//! Points live as one JSON file each, sharded into directories by a
//! quantized random projection of their vector. A binary id index, a reverse
//! path index and an HNSW graph sit next to them; collection metadata is
//! guarded by advisory file locks so a daemon and ad-hoc processes can share
//! one index directory.

pub mod config;
pub mod display;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod git;
pub mod index;
pub mod logging;
pub mod storage;
pub mod store;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use embedding::{EmbeddingError, EmbeddingProvider};
pub use error::{StoreError, StoreResult};
pub use filter::{Filter, FilterError};
pub use git::{GitCli, NoVersionControl, VersionControl};
pub use store::{CollectionCache, FilesystemVectorStore};
pub use types::{
    AnnUpdate, CollectionInfo, HealthReport, IndexingSummary, Payload, PointRecord,
    ResolvedContent, ScrollPage, ScrollRequest, SearchHit, SearchParams, StalenessReason,
    StoredPoint, UpsertSummary, VectorPoint, WriteMode,
};
