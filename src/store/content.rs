//! Content storage policy and query-time content resolution.
//!
//! Chunks of clean, tracked files are stored as a blob hash only; the text
//! is recovered from the working tree or from git when a hit is displayed.
//! Everything git cannot reproduce keeps its literal text.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use super::FilesystemVectorStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChunkKind, ContentSource, PointRecord, ResolvedContent, StalenessReason, VectorPoint,
    payload_keys,
};

/// Git state of the files touched by one upsert batch.
#[derive(Debug, Default)]
pub(crate) struct GitSnapshot {
    pub(crate) blob_hashes: HashMap<String, String>,
    pub(crate) dirty: HashSet<String>,
}

impl GitSnapshot {
    fn tracked_clean_hash(&self, path: &str) -> Option<&str> {
        if self.dirty.contains(path) {
            return None;
        }
        self.blob_hashes.get(path).map(String::as_str)
    }

    fn uncommitted(&self, path: &str) -> bool {
        self.dirty.contains(path) || !self.blob_hashes.contains_key(path)
    }
}

fn line_field(payload: &crate::types::Payload, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

fn is_reconstructible_diff(point: &VectorPoint) -> bool {
    let flagged = point
        .payload
        .get(payload_keys::RECONSTRUCT_FROM_GIT)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let diff_type = point
        .payload
        .get(payload_keys::DIFF_TYPE)
        .and_then(Value::as_str);
    flagged
        && matches!(diff_type, Some("added" | "deleted"))
        && point
            .payload
            .get(payload_keys::COMMIT_HASH)
            .and_then(Value::as_str)
            .is_some()
        && point.file_path().is_some()
}

fn require_text(point: &VectorPoint, what: &str) -> StoreResult<String> {
    point
        .chunk_text
        .clone()
        .ok_or_else(|| StoreError::InvariantViolation {
            reason: format!("point '{}' ({what}) has no chunk text to store", point.id),
        })
}

impl FilesystemVectorStore {
    /// Query git once for every working-tree path in `points`.
    pub(crate) fn git_snapshot(&self, points: &[VectorPoint]) -> GitSnapshot {
        let mut paths: Vec<String> = points
            .iter()
            .filter(|p| p.kind() == ChunkKind::Content)
            .filter_map(|p| p.file_path().map(str::to_string))
            .collect();
        paths.sort();
        paths.dedup();
        if paths.is_empty() {
            return GitSnapshot::default();
        }
        GitSnapshot {
            blob_hashes: self.vcs.blob_hashes(&paths),
            dirty: self.vcs.dirty_paths(&paths),
        }
    }

    /// Build the on-disk record for `point` under the content storage policy.
    pub(crate) fn build_record(
        &self,
        point: &VectorPoint,
        git: &GitSnapshot,
    ) -> StoreResult<PointRecord> {
        let file_path = point.file_path().map(str::to_string);
        let mut record = PointRecord {
            id: point.id.clone(),
            vector: point.vector.clone(),
            payload: point.payload.clone(),
            file_path: file_path.clone(),
            start_line: line_field(&point.payload, payload_keys::LINE_START),
            end_line: line_field(&point.payload, payload_keys::LINE_END),
            indexed_at: chrono::Utc::now().to_rfc3339(),
            chunk_text: None,
            git_blob_hash: None,
            indexed_with_uncommitted_changes: false,
        };

        match point.kind() {
            ChunkKind::CommitMessage => {
                record.chunk_text = Some(require_text(point, "commit message")?);
            }
            ChunkKind::CommitDiff if is_reconstructible_diff(point) => {}
            ChunkKind::CommitDiff => {
                record.chunk_text = Some(require_text(point, "commit diff")?);
            }
            ChunkKind::Content => match file_path.as_deref() {
                Some(path) => match git.tracked_clean_hash(path) {
                    Some(hash) => record.git_blob_hash = Some(hash.to_string()),
                    None => {
                        record.chunk_text = Some(require_text(point, "uncommitted file")?);
                        record.indexed_with_uncommitted_changes = git.uncommitted(path);
                    }
                },
                None => record.chunk_text = Some(require_text(point, "content")?),
            },
        }
        Ok(record)
    }

    fn working_root(&self) -> Option<PathBuf> {
        self.vcs
            .repo_root()
            .or_else(|| self.settings.workspace_root.clone())
            .or_else(|| std::env::current_dir().ok())
    }

    /// Displayable text of a stored record, with a staleness marker when the
    /// working tree no longer matches what was indexed.
    pub(crate) fn resolve_content(&self, record: &PointRecord) -> Option<ResolvedContent> {
        if let Some(text) = &record.chunk_text {
            return Some(ResolvedContent {
                text: text.clone(),
                source: ContentSource::Stored,
                staleness: None,
            });
        }

        if let Some(hash) = &record.git_blob_hash {
            return self.resolve_blob(record, hash);
        }

        if record.kind() == ChunkKind::CommitDiff {
            return self.resolve_history(record);
        }

        tracing::debug!(id = %record.id, "record carries neither text nor git reference");
        None
    }

    fn resolve_blob(&self, record: &PointRecord, hash: &str) -> Option<ResolvedContent> {
        let path = record.file_path.as_deref()?;
        let from_blob = |staleness| {
            self.vcs.blob_content(hash).map(|text| ResolvedContent {
                text: slice_lines(&text, record.start_line, record.end_line),
                source: ContentSource::GitBlob,
                staleness: Some(staleness),
            })
        };

        let absolute = self.working_root()?.join(path);
        if !absolute.is_file() {
            return from_blob(StalenessReason::Deleted);
        }

        match self.vcs.working_tree_hash(path) {
            Some(current) if current == hash => match std::fs::read_to_string(&absolute) {
                Ok(text) => Some(ResolvedContent {
                    text: slice_lines(&text, record.start_line, record.end_line),
                    source: ContentSource::WorkingTree,
                    staleness: None,
                }),
                Err(e) => {
                    tracing::debug!(path = %absolute.display(), "reading working file failed: {e}");
                    from_blob(StalenessReason::Error)
                }
            },
            Some(_) => from_blob(StalenessReason::Modified),
            None => from_blob(StalenessReason::Error),
        }
    }

    fn resolve_history(&self, record: &PointRecord) -> Option<ResolvedContent> {
        let commit = record
            .payload
            .get(payload_keys::COMMIT_HASH)
            .and_then(Value::as_str)?;
        let path = record.file_path.as_deref()?;
        let revision = match record
            .payload
            .get(payload_keys::DIFF_TYPE)
            .and_then(Value::as_str)
        {
            // A deleted file only exists in the parent of the deleting commit
            Some("deleted") => format!("{commit}^"),
            _ => commit.to_string(),
        };
        let text = self.vcs.file_at_revision(&revision, path)?;
        Some(ResolvedContent {
            text,
            source: ContentSource::GitHistory,
            staleness: None,
        })
    }
}

/// Lines `start..=end` (1-based) of `text`; the whole text without bounds.
fn slice_lines(text: &str, start: Option<u64>, end: Option<u64>) -> String {
    if start.is_none() && end.is_none() {
        return text.to_string();
    }
    let first = start.unwrap_or(1).max(1) as usize;
    let last = end.map_or(usize::MAX, |e| e as usize);
    if last < first {
        return String::new();
    }
    text.lines()
        .skip(first - 1)
        .take(last - first + 1)
        .collect::<Vec<_>>()
        .join("\n")
}
