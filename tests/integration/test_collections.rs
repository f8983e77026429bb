//! Collection lifecycle through the public store API.

use crate::common::{DIM, create_test_store, test_settings};
use codevec::{FilesystemVectorStore, StoreError};
use tempfile::TempDir;

#[test]
fn test_create_is_idempotent_and_listed() {
    let (store, _temp_dir) = create_test_store();

    assert!(!store.create_collection("code", DIM).unwrap());
    assert!(store.create_collection("docs", 8).unwrap());
    assert_eq!(store.list_collections().unwrap(), vec!["code", "docs"]);
    assert!(store.collection_exists("docs"));
    assert!(!store.collection_exists("missing"));

    // The index tree keeps itself out of version control
    let gitignore = store.base_path().join(".gitignore");
    assert_eq!(std::fs::read_to_string(gitignore).unwrap(), "*\n");
}

#[test]
fn test_zero_dimension_is_rejected() {
    let (store, _temp_dir) = create_test_store();
    assert!(matches!(
        store.create_collection("empty", 0),
        Err(StoreError::InvalidArgument { .. })
    ));
}

#[test]
fn test_info_of_new_collection() {
    let (store, _temp_dir) = create_test_store();
    let info = store.collection_info("code").unwrap();

    assert_eq!(info.name, "code");
    assert_eq!(info.vector_size, DIM);
    assert_eq!(info.point_count, 0);
    assert!(info.stale, "no ANN index exists yet");
    assert!(info.ann.is_none());
}

#[test]
fn test_delete_collection_removes_everything() {
    let (store, _temp_dir) = create_test_store();
    let dir = store.base_path().join("code");
    assert!(dir.is_dir());

    assert!(store.delete_collection("code").unwrap());
    assert!(!dir.exists());
    assert!(!store.delete_collection("code").unwrap());
    assert!(matches!(
        store.count_points("code"),
        Err(StoreError::CollectionNotFound { .. })
    ));
}

#[test]
fn test_health_check() {
    let (store, _temp_dir) = create_test_store();
    let report = store.health_check();
    assert!(report.is_healthy());
    assert_eq!(report.collections, 1);
}

#[test]
fn test_missing_projection_matrix_is_a_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let settings = test_settings(&temp_dir);
    {
        let store = FilesystemVectorStore::open(&settings).unwrap();
        store.create_collection("code", DIM).unwrap();
    }
    let matrix = settings
        .resolved_index_path()
        .join("code")
        .join(codevec::vector::PROJECTION_MATRIX_FILE);
    std::fs::remove_file(matrix).unwrap();

    let store = FilesystemVectorStore::open(&settings).unwrap();
    let result = store.upsert_points(
        "code",
        vec![crate::common::chunk("a", "src/a.py", 1)],
        codevec::WriteMode::Batch,
    );
    assert!(matches!(
        result,
        Err(StoreError::ProjectionMatrixNotFound { .. })
    ));
}

#[test]
fn test_legacy_index_tracks_points_when_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = test_settings(&temp_dir);
    settings.storage.legacy_index = true;
    let store = FilesystemVectorStore::open(&settings).unwrap();
    store.create_collection("code", DIM).unwrap();

    let points = (0..6)
        .map(|i| crate::common::chunk(&format!("l{i}"), &format!("l{i}.py"), i))
        .collect();
    store
        .upsert_points("code", points, codevec::WriteMode::Batch)
        .unwrap();

    let query = crate::common::vector(3);
    let candidates = store.legacy_candidates("code", &query, 0, 10).unwrap();
    assert_eq!(candidates.first().map(|(id, d)| (id.as_str(), *d)), Some(("l3", 0)));

    store
        .delete_points("code", &["l3".to_string()], codevec::WriteMode::Batch)
        .unwrap();
    let candidates = store.legacy_candidates("code", &query, 0, 10).unwrap();
    assert!(candidates.iter().all(|(id, _)| id != "l3"));

    // Persisted alongside the other indices
    let dir = settings.resolved_index_path().join("code");
    let reloaded = codevec::index::VectorIndexManager::load(&dir).unwrap();
    assert_eq!(reloaded.len(), 5);
}

#[test]
fn test_legacy_candidates_require_the_setting() {
    let (store, _temp_dir) = create_test_store();
    assert!(matches!(
        store.legacy_candidates("code", &crate::common::vector(1), 4, 10),
        Err(StoreError::Config { .. })
    ));
}
