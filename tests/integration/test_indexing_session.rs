//! begin_indexing / end_indexing and ANN index reconciliation.

use crate::common::{chunk, create_test_store};
use codevec::index::HnswIndexManager;
use codevec::storage::{CollectionMetadata, scan_point_files};
use codevec::{AnnUpdate, VectorPoint, WriteMode};

fn index_files(store: &codevec::FilesystemVectorStore, count: u64) {
    let points: Vec<VectorPoint> = (0..count)
        .map(|i| chunk(&format!("p{i}"), &format!("src/f{i}.py"), i))
        .collect();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
}

#[test]
fn test_first_session_builds_index() {
    let (store, _temp_dir) = create_test_store();

    store.begin_indexing("code").unwrap();
    index_files(&store, 10);
    let summary = store.end_indexing("code", false).unwrap();

    assert_eq!(summary.ann_update, AnnUpdate::FullRebuild { vectors: 10 });
    assert_eq!(summary.vectors, 10);
    assert_eq!(summary.unique_files, 10);
    assert!(!store.is_index_stale("code").unwrap());

    let info = store.collection_info("code").unwrap();
    assert_eq!(info.unique_file_count, 10);
    assert_eq!(info.ann.map(|ann| ann.vector_count), Some(10));
}

#[test]
fn test_small_change_set_is_applied_incrementally() {
    let (store, _temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 20);
    store.end_indexing("code", false).unwrap();

    store.begin_indexing("code").unwrap();
    store
        .upsert_points("code", vec![chunk("new", "src/new.py", 99)], WriteMode::Batch)
        .unwrap();
    store
        .delete_points("code", &["p3".to_string()], WriteMode::Batch)
        .unwrap();
    let summary = store.end_indexing("code", false).unwrap();

    assert_eq!(
        summary.ann_update,
        AnnUpdate::Incremental {
            upserted: 1,
            removed: 1
        }
    );
    assert_eq!(summary.vectors, 20);
    assert!(!store.is_index_stale("code").unwrap());
}

#[test]
fn test_large_change_set_falls_back_to_rebuild() {
    let (store, _temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 4);
    store.end_indexing("code", false).unwrap();

    store.begin_indexing("code").unwrap();
    let points: Vec<VectorPoint> = (10..14)
        .map(|i| chunk(&format!("q{i}"), &format!("src/g{i}.py"), i))
        .collect();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
    let summary = store.end_indexing("code", false).unwrap();

    assert_eq!(summary.ann_update, AnnUpdate::FullRebuild { vectors: 8 });
}

#[test]
fn test_empty_session_leaves_index_unchanged() {
    let (store, _temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 3);
    store.end_indexing("code", false).unwrap();

    store.begin_indexing("code").unwrap();
    let summary = store.end_indexing("code", false).unwrap();
    assert_eq!(summary.ann_update, AnnUpdate::Unchanged);
}

#[test]
fn test_deferred_session_marks_stale_and_search_rebuilds() {
    let (store, _temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 5);
    store.end_indexing("code", false).unwrap();

    store.begin_indexing("code").unwrap();
    store
        .upsert_points("code", vec![chunk("late", "src/late.py", 42)], WriteMode::Batch)
        .unwrap();
    let summary = store.end_indexing("code", true).unwrap();
    assert_eq!(summary.ann_update, AnnUpdate::MarkedStale);
    assert!(store.is_index_stale("code").unwrap());

    let dir = store.base_path().join("code");
    let metadata = CollectionMetadata::load(&dir).unwrap();
    let hnsw = metadata.hnsw_index.unwrap();
    assert!(hnsw.is_stale);
    assert!(hnsw.last_marked_stale.is_some());

    // Query-time rebuild picks up the deferred point
    let hits = store
        .search_by_vector("code", &crate::common::vector(42), &Default::default())
        .unwrap();
    assert_eq!(hits[0].id, "late");
    assert!(!store.is_index_stale("code").unwrap());
}

#[test]
fn test_count_mismatch_is_detected_as_stale() {
    let (store, _temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 3);
    store.end_indexing("code", false).unwrap();

    let dir = store.base_path().join("code");
    let manager = HnswIndexManager::new(store.settings().hnsw.clone());
    assert!(!manager.is_stale(&dir));

    // Remove a point file behind the store's back
    let files = scan_point_files(&dir);
    std::fs::remove_file(&files[0]).unwrap();
    assert!(manager.is_stale(&dir));

    assert_eq!(store.rebuild_index("code").unwrap(), 2);
    assert!(!manager.is_stale(&dir));
}

#[test]
fn test_indices_survive_reopen() {
    let (store, temp_dir) = create_test_store();
    store.begin_indexing("code").unwrap();
    index_files(&store, 6);
    store.end_indexing("code", false).unwrap();
    let settings = store.settings().clone();
    drop(store);

    let reopened = codevec::FilesystemVectorStore::open(&settings).unwrap();
    assert_eq!(reopened.count_points("code").unwrap(), 6);
    assert_eq!(reopened.get_all_indexed_files("code").unwrap().len(), 6);
    assert!(reopened.get_point("code", "p4").unwrap().is_some());
    drop(temp_dir);
}
