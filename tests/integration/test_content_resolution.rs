//! Git-aware content storage and staleness-aware retrieval.

use crate::common::{create_repo_store, payload, vector};
use codevec::storage::{read_record, scan_point_files};
use codevec::types::ContentSource;
use codevec::{StalenessReason, StoreError, VectorPoint, WriteMode};
use serde_json::json;

const SOURCE: &str = "def login():\n    check()\n    return True\n\ndef logout():\n    pass\n";

fn login_chunk() -> VectorPoint {
    VectorPoint::new("login", vector(1))
        .with_payload(payload(json!({
            "path": "src/auth.py",
            "line_start": 1,
            "line_end": 3,
        })))
        .with_text("def login():\n    check()\n    return True")
}

#[test]
fn test_clean_tracked_file_stores_hash_only() {
    let (store, repo, _temp_dir) = create_repo_store();
    let hash = repo.commit("src/auth.py", SOURCE);

    store
        .upsert_points("code", vec![login_chunk()], WriteMode::Batch)
        .unwrap();

    let files = scan_point_files(&store.base_path().join("code"));
    let record = read_record(&files[0]).unwrap();
    assert_eq!(record.git_blob_hash.as_deref(), Some(hash.as_str()));
    assert!(record.chunk_text.is_none());
    assert!(!record.indexed_with_uncommitted_changes);
    assert_eq!(record.start_line, Some(1));

    let point = store.get_point("code", "login").unwrap().unwrap();
    let content = point.content.unwrap();
    assert_eq!(content.source, ContentSource::WorkingTree);
    assert_eq!(content.text, "def login():\n    check()\n    return True");
    assert!(!content.is_stale());
}

#[test]
fn test_dirty_file_stores_text() {
    let (store, repo, _temp_dir) = create_repo_store();
    repo.commit("src/auth.py", SOURCE);
    repo.write("src/auth.py", "def login():\n    return False\n");

    store
        .upsert_points("code", vec![login_chunk()], WriteMode::Batch)
        .unwrap();

    let files = scan_point_files(&store.base_path().join("code"));
    let record = read_record(&files[0]).unwrap();
    assert!(record.git_blob_hash.is_none());
    assert!(record.chunk_text.is_some());
    assert!(record.indexed_with_uncommitted_changes);

    let content = store.get_point("code", "login").unwrap().unwrap().content.unwrap();
    assert_eq!(content.source, ContentSource::Stored);
}

#[test]
fn test_modified_after_indexing_falls_back_to_blob() {
    let (store, repo, _temp_dir) = create_repo_store();
    repo.commit("src/auth.py", SOURCE);
    store
        .upsert_points("code", vec![login_chunk()], WriteMode::Batch)
        .unwrap();

    repo.write("src/auth.py", "completely different\n");
    let content = store.get_point("code", "login").unwrap().unwrap().content.unwrap();
    assert_eq!(content.source, ContentSource::GitBlob);
    assert_eq!(content.staleness, Some(StalenessReason::Modified));
    assert_eq!(content.text, "def login():\n    check()\n    return True");
}

#[test]
fn test_deleted_after_indexing_falls_back_to_blob() {
    let (store, repo, temp_dir) = create_repo_store();
    repo.commit("src/auth.py", SOURCE);
    store
        .upsert_points("code", vec![login_chunk()], WriteMode::Batch)
        .unwrap();

    std::fs::remove_file(temp_dir.path().join("repo/src/auth.py")).unwrap();
    let content = store.get_point("code", "login").unwrap().unwrap().content.unwrap();
    assert_eq!(content.staleness, Some(StalenessReason::Deleted));
    assert!(content.text.starts_with("def login()"));
}

#[test]
fn test_commit_message_requires_text() {
    let (store, _repo, _temp_dir) = create_repo_store();
    let message = VectorPoint::new("msg", vector(2)).with_payload(payload(json!({
        "type": "commit_message",
        "commit_hash": "abc123",
    })));

    let result = store.upsert_points("code", vec![message.clone()], WriteMode::Batch);
    assert!(matches!(result, Err(StoreError::InvariantViolation { .. })));

    store
        .upsert_points("code", vec![message.with_text("Fix login")], WriteMode::Batch)
        .unwrap();
    let content = store.get_point("code", "msg").unwrap().unwrap().content.unwrap();
    assert_eq!(content.text, "Fix login");
}

#[test]
fn test_added_diff_is_rebuilt_from_history() {
    let (store, repo, _temp_dir) = create_repo_store();
    repo.record_revision("c0ffee", "src/new.py", "print('new')\n");
    repo.record_revision("c0ffee^", "src/old.py", "print('old')\n");

    let added = VectorPoint::new("diff_added", vector(3)).with_payload(payload(json!({
        "type": "commit_diff",
        "diff_type": "added",
        "commit_hash": "c0ffee",
        "path": "src/new.py",
        "reconstruct_from_git": true,
    })));
    let deleted = VectorPoint::new("diff_deleted", vector(4)).with_payload(payload(json!({
        "type": "commit_diff",
        "diff_type": "deleted",
        "commit_hash": "c0ffee",
        "path": "src/old.py",
        "reconstruct_from_git": true,
    })));
    store
        .upsert_points("code", vec![added, deleted], WriteMode::Batch)
        .unwrap();

    let content = store.get_point("code", "diff_added").unwrap().unwrap().content.unwrap();
    assert_eq!(content.source, ContentSource::GitHistory);
    assert_eq!(content.text, "print('new')\n");

    let content = store.get_point("code", "diff_deleted").unwrap().unwrap().content.unwrap();
    assert_eq!(content.text, "print('old')\n");

    // History records never take part in duplicate cleanup
    assert!(store.get_all_indexed_files("code").unwrap().is_empty());
}

#[test]
fn test_modified_diff_keeps_text() {
    let (store, _repo, _temp_dir) = create_repo_store();
    let modified = VectorPoint::new("diff_mod", vector(5)).with_payload(payload(json!({
        "type": "commit_diff",
        "diff_type": "modified",
        "commit_hash": "c0ffee",
        "path": "src/auth.py",
        "reconstruct_from_git": true,
    })));
    assert!(matches!(
        store.upsert_points("code", vec![modified.clone()], WriteMode::Batch),
        Err(StoreError::InvariantViolation { .. })
    ));
    store
        .upsert_points("code", vec![modified.with_text("-a\n+b")], WriteMode::Batch)
        .unwrap();
    let content = store.get_point("code", "diff_mod").unwrap().unwrap().content.unwrap();
    assert_eq!(content.source, ContentSource::Stored);
}
