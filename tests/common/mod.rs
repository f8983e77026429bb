//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use codevec::{
    EmbeddingError, EmbeddingProvider, FilesystemVectorStore, Payload, Settings, VectorPoint,
    VersionControl,
};
use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const DIM: usize = 16;

/// Settings isolated from the host: no git discovery, default layout.
pub fn test_settings(temp_dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.index_path = temp_dir.path().join("index");
    settings.workspace_root = Some(temp_dir.path().to_path_buf());
    settings.git.enabled = false;
    settings
}

/// Store over a fresh temp dir with one collection named `code`.
pub fn create_test_store() -> (FilesystemVectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let settings = test_settings(&temp_dir);
    let store = FilesystemVectorStore::open(&settings).expect("Failed to open store");
    assert!(store.create_collection("code", DIM).unwrap());
    (store, temp_dir)
}

/// Deterministic, well-spread vector for `seed`.
pub fn vector(seed: u64) -> Vec<f32> {
    (0..DIM)
        .map(|i| {
            let x = (seed as f32 + 1.0) * 12.9898 + i as f32 * 78.233;
            (x.sin() * 43_758.547).fract() - 0.5
        })
        .collect()
}

pub fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// A content chunk of `path` with literal text.
pub fn chunk(id: &str, path: &str, seed: u64) -> VectorPoint {
    VectorPoint::new(id, vector(seed))
        .with_payload(payload(json!({
            "path": path,
            "line_start": 1,
            "line_end": 3,
            "language": "python",
        })))
        .with_text(format!("# chunk {id}\n"))
}

/// Embedding provider answering from a fixed table.
#[derive(Default)]
pub struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl EmbeddingProvider for TableEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::Generation(format!("no vector for '{text}'")))
    }

    fn model_name(&self) -> &str {
        "table"
    }
}

pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// In-memory stand-in for a git checkout rooted at a temp dir.
pub struct FakeRepo {
    root: PathBuf,
    /// path -> committed blob hash
    head: Mutex<HashMap<String, String>>,
    /// blob hash -> content
    blobs: Mutex<HashMap<String, String>>,
    /// (revision, path) -> content
    history: Mutex<HashMap<(String, String), String>>,
}

impl FakeRepo {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            head: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn write(&self, path: &str, content: &str) {
        let file = self.root.join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(file, content).expect("Failed to write file");
    }

    /// Write and commit `content` at `path`; returns the blob hash.
    pub fn commit(&self, path: &str, content: &str) -> String {
        self.write(path, content);
        let hash = content_hash(content);
        self.blobs.lock().insert(hash.clone(), content.to_string());
        self.head.lock().insert(path.to_string(), hash.clone());
        hash
    }

    pub fn record_revision(&self, revision: &str, path: &str, content: &str) {
        self.history
            .lock()
            .insert((revision.to_string(), path.to_string()), content.to_string());
    }
}

impl VersionControl for FakeRepo {
    fn repo_root(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn blob_hashes(&self, paths: &[String]) -> HashMap<String, String> {
        let head = self.head.lock();
        paths
            .iter()
            .filter_map(|p| head.get(p).map(|h| (p.clone(), h.clone())))
            .collect()
    }

    fn dirty_paths(&self, paths: &[String]) -> HashSet<String> {
        let head = self.head.lock();
        paths
            .iter()
            .filter(|p| head.get(*p).cloned() != self.working_tree_hash(p))
            .cloned()
            .collect()
    }

    fn blob_content(&self, hash: &str) -> Option<String> {
        self.blobs.lock().get(hash).cloned()
    }

    fn working_tree_hash(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.root.join(path))
            .ok()
            .map(|content| content_hash(&content))
    }

    fn file_at_revision(&self, revision: &str, path: &str) -> Option<String> {
        self.history
            .lock()
            .get(&(revision.to_string(), path.to_string()))
            .cloned()
    }
}

/// Store wired to a [`FakeRepo`] rooted in the temp dir.
pub fn create_repo_store() -> (FilesystemVectorStore, Arc<FakeRepo>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let settings = test_settings(&temp_dir);
    let repo = Arc::new(FakeRepo::new(&temp_dir.path().join("repo")));
    let store = FilesystemVectorStore::open(&settings)
        .expect("Failed to open store")
        .with_version_control(repo.clone());
    assert!(store.create_collection("code", DIM).unwrap());
    (store, repo, temp_dir)
}
