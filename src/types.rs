//! Data types exchanged with callers of the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DistanceSpace;
use crate::filter::Filter;

/// Semantic attributes attached to a point.
pub type Payload = serde_json::Map<String, Value>;

/// Payload keys the store itself interprets.
pub mod payload_keys {
    /// Source file path of the chunk
    pub const PATH: &str = "path";
    pub const LINE_START: &str = "line_start";
    pub const LINE_END: &str = "line_end";
    /// Record kind: `content`, `commit_message` or `commit_diff`
    pub const TYPE: &str = "type";
    /// `added`, `deleted` or `modified` for diff records
    pub const DIFF_TYPE: &str = "diff_type";
    pub const COMMIT_HASH: &str = "commit_hash";
    /// Diff record can be rebuilt from version control at query time
    pub const RECONSTRUCT_FROM_GIT: &str = "reconstruct_from_git";
}

/// Record kinds with distinct content-storage rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Chunk of a regular working-tree file
    Content,
    CommitMessage,
    CommitDiff,
}

impl ChunkKind {
    fn from_payload(payload: &Payload) -> Self {
        match payload.get(payload_keys::TYPE).and_then(Value::as_str) {
            Some("commit_message") => Self::CommitMessage,
            Some("commit_diff") => Self::CommitDiff,
            _ => Self::Content,
        }
    }
}

/// A point handed to `upsert_points`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
    /// Literal text of the chunk, when the caller has it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_text: Option<String>,
}

impl VectorPoint {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: Payload::new(),
            chunk_text: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.chunk_text = Some(text.into());
        self
    }

    /// Source file path from the payload, if any.
    pub fn file_path(&self) -> Option<&str> {
        self.payload.get(payload_keys::PATH).and_then(Value::as_str)
    }

    pub fn kind(&self) -> ChunkKind {
        ChunkKind::from_payload(&self.payload)
    }
}

/// On-disk form of a point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u64>,
    /// RFC 3339 timestamp of the write
    pub indexed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_blob_hash: Option<String>,
    #[serde(default)]
    pub indexed_with_uncommitted_changes: bool,
}

impl PointRecord {
    pub fn kind(&self) -> ChunkKind {
        ChunkKind::from_payload(&self.payload)
    }
}

/// Why returned content may not match the current working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessReason {
    /// The working file changed since indexing
    Modified,
    /// The working file no longer exists
    Deleted,
    /// The working file could not be read or hashed
    Error,
}

/// Where resolved content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Literal text stored in the point record
    Stored,
    /// Current working file, hash matched
    WorkingTree,
    /// Blob content looked up by stored hash
    GitBlob,
    /// Rebuilt from a historical commit
    GitHistory,
}

/// Displayable content of a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContent {
    pub text: String,
    pub source: ContentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness: Option<StalenessReason>,
}

impl ResolvedContent {
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.staleness.is_some()
    }
}

/// Tunables for one search call.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub filter: Option<Filter>,
    /// Query-time accuracy knob; collection default when unset
    pub ef: Option<usize>,
    /// Lower bound on ANN candidates before exact re-scoring
    pub prefetch: Option<usize>,
    /// Skip content resolution for hits
    pub skip_content: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 10,
            score_threshold: None,
            filter: None,
            ef: None,
            prefetch: None,
            skip_content: false,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    /// Exact cosine similarity to the query
    pub score: f32,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ResolvedContent>,
}

/// Paging options for `scroll_points`.
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    pub limit: usize,
    /// Relative path of the last point file returned by the previous page
    pub offset: Option<String>,
    pub with_payload: bool,
    pub with_vector: bool,
    pub filter: Option<Filter>,
}

impl Default for ScrollRequest {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: None,
            with_payload: true,
            with_vector: false,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrolledPoint {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrollPage {
    pub points: Vec<ScrolledPoint>,
    /// Pass back as `offset` to continue; `None` when exhausted
    pub next_offset: Option<String>,
}

/// When the ANN index learns about a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Deferred to `end_indexing`
    #[default]
    Batch,
    /// Applied to the ANN index immediately
    Watch,
}

/// Outcome of one `upsert_points` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub upserted: usize,
    /// Older chunks of re-indexed files that were removed
    pub removed_orphans: usize,
}

/// How `end_indexing` reconciled the ANN index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum AnnUpdate {
    Incremental { upserted: usize, removed: usize },
    FullRebuild { vectors: usize },
    MarkedStale,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexingSummary {
    pub vectors: usize,
    pub unique_files: usize,
    pub ann_update: AnnUpdate,
}

/// ANN statistics reported by `collection_info`.
#[derive(Debug, Clone, Serialize)]
pub struct AnnSummary {
    pub vector_count: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub space: DistanceSpace,
    pub last_rebuild: String,
    pub file_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: usize,
    pub point_count: usize,
    pub unique_file_count: usize,
    pub created_at: String,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann: Option<AnnSummary>,
}

/// A stored point with its resolved content.
#[derive(Debug, Clone, Serialize)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ResolvedContent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub index_path: String,
    pub reachable: bool,
    pub writable: bool,
    pub collections: usize,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.writable
    }
}
