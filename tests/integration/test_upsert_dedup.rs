//! Re-indexing a file replaces its chunks instead of accumulating them.

use crate::common::{DIM, chunk, create_test_store, vector};
use codevec::index::{IdIndexManager, PathIndex};
use codevec::storage::scan_point_files;
use codevec::{StoreError, VectorPoint, WriteMode};

#[test]
fn test_shrinking_file_leaves_no_orphans() {
    let (store, _temp_dir) = create_test_store();
    let dir = store.base_path().join("code");

    store.begin_indexing("code").unwrap();
    let first: Vec<VectorPoint> = (0..5)
        .map(|i| chunk(&format!("auth_v1_{i}"), "src/auth.py", i))
        .collect();
    let summary = store
        .upsert_points("code", first, WriteMode::Batch)
        .unwrap();
    assert_eq!(summary.upserted, 5);
    assert_eq!(summary.removed_orphans, 0);
    store.end_indexing("code", false).unwrap();
    assert_eq!(store.count_points("code").unwrap(), 5);

    store.begin_indexing("code").unwrap();
    let second: Vec<VectorPoint> = (0..2)
        .map(|i| chunk(&format!("auth_v2_{i}"), "src/auth.py", 100 + i))
        .collect();
    let summary = store
        .upsert_points("code", second, WriteMode::Batch)
        .unwrap();
    assert_eq!(summary.removed_orphans, 5);
    let indexing = store.end_indexing("code", false).unwrap();
    assert_eq!(indexing.vectors, 2);
    assert_eq!(indexing.unique_files, 1);

    assert_eq!(scan_point_files(&dir).len(), 2);
    let ids = IdIndexManager::load_index(&dir).unwrap();
    assert_eq!(ids.len(), 2);
    for i in 0..5 {
        assert!(!ids.contains_key(&format!("auth_v1_{i}")));
        assert!(store.get_point("code", &format!("auth_v1_{i}")).unwrap().is_none());
    }

    let paths = PathIndex::load(&dir).unwrap();
    let registered = paths.get_point_ids("src/auth.py");
    assert_eq!(registered.len(), 2);
    assert!(registered.contains("auth_v2_0") && registered.contains("auth_v2_1"));
}

#[test]
fn test_growing_and_unchanged_files() {
    let (store, _temp_dir) = create_test_store();

    let initial: Vec<VectorPoint> = (0..2).map(|i| chunk(&format!("a{i}"), "a.py", i)).collect();
    store.upsert_points("code", initial, WriteMode::Batch).unwrap();

    // Same ids again: nothing is orphaned
    let same: Vec<VectorPoint> = (0..2).map(|i| chunk(&format!("a{i}"), "a.py", i + 10)).collect();
    let summary = store.upsert_points("code", same, WriteMode::Batch).unwrap();
    assert_eq!(summary.removed_orphans, 0);
    assert_eq!(store.count_points("code").unwrap(), 2);

    // Grow to four chunks, keeping one old id
    let grown: Vec<VectorPoint> = ["a0", "b1", "b2", "b3"]
        .iter()
        .enumerate()
        .map(|(i, id)| chunk(id, "a.py", 20 + i as u64))
        .collect();
    let summary = store.upsert_points("code", grown, WriteMode::Batch).unwrap();
    assert_eq!(summary.removed_orphans, 1);
    assert_eq!(store.count_points("code").unwrap(), 4);
    assert!(store.get_point("code", "a1").unwrap().is_none());
}

#[test]
fn test_other_files_are_untouched() {
    let (store, _temp_dir) = create_test_store();
    store
        .upsert_points(
            "code",
            vec![chunk("x0", "x.py", 1), chunk("y0", "y.py", 2)],
            WriteMode::Batch,
        )
        .unwrap();
    store
        .upsert_points("code", vec![chunk("x1", "x.py", 3)], WriteMode::Batch)
        .unwrap();

    assert!(store.get_point("code", "y0").unwrap().is_some());
    assert_eq!(store.get_all_indexed_files("code").unwrap(), vec!["x.py", "y.py"]);
}

#[test]
fn test_dimension_mismatch_fails_before_writing() {
    let (store, _temp_dir) = create_test_store();
    let good = chunk("good", "a.py", 1);
    let bad = VectorPoint::new("bad", vec![0.5; DIM + 1]);

    let result = store.upsert_points("code", vec![good, bad], WriteMode::Batch);
    assert!(matches!(
        result,
        Err(StoreError::DimensionMismatch { expected, actual, .. }) if expected == DIM && actual == DIM + 1
    ));
    assert_eq!(store.count_points("code").unwrap(), 0);
}

#[test]
fn test_missing_text_for_untracked_file_is_an_invariant_violation() {
    let (store, _temp_dir) = create_test_store();
    let mut point = chunk("p", "a.py", 1);
    point.chunk_text = None;

    let result = store.upsert_points("code", vec![point], WriteMode::Batch);
    assert!(matches!(result, Err(StoreError::InvariantViolation { .. })));
}

#[test]
fn test_delete_points() {
    let (store, _temp_dir) = create_test_store();
    store
        .upsert_points(
            "code",
            vec![chunk("d0", "d.py", 1), chunk("d1", "d.py", 2)],
            WriteMode::Batch,
        )
        .unwrap();

    let removed = store
        .delete_points(
            "code",
            &["d0".to_string(), "unknown".to_string()],
            WriteMode::Batch,
        )
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count_points("code").unwrap(), 1);
    assert!(store.get_point("code", "d0").unwrap().is_none());

    let remaining = store.get_point("code", "d1").unwrap().unwrap();
    assert_eq!(remaining.vector, vector(2));
}

#[test]
fn test_long_ids_are_stored_under_hashed_names() {
    let (store, _temp_dir) = create_test_store();
    let id = format!("src/deeply/nested/module.py:{}", "x".repeat(200));
    store
        .upsert_points("code", vec![chunk(&id, "m.py", 4)], WriteMode::Batch)
        .unwrap();

    let point = store.get_point("code", &id).unwrap().unwrap();
    assert_eq!(point.id, id);
}
