//! Real-time updates, standalone and with the daemon cache.

use crate::common::{DIM, chunk, test_settings, vector};
use codevec::{FilesystemVectorStore, SearchParams, WriteMode};
use std::sync::Arc;
use tempfile::TempDir;

fn daemon_store() -> (FilesystemVectorStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemVectorStore::open(&test_settings(&temp_dir))
        .unwrap()
        .with_daemon_cache();
    store.create_collection("code", DIM).unwrap();
    (store, temp_dir)
}

#[test]
fn test_watch_upsert_is_searchable_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemVectorStore::open(&test_settings(&temp_dir)).unwrap();
    store.create_collection("code", DIM).unwrap();

    store
        .upsert_points("code", vec![chunk("w0", "w.py", 1)], WriteMode::Watch)
        .unwrap();
    assert!(!store.is_index_stale("code").unwrap());

    store
        .upsert_points("code", vec![chunk("w1", "v.py", 2)], WriteMode::Watch)
        .unwrap();
    assert!(!store.is_index_stale("code").unwrap());

    let hits = store
        .search_by_vector("code", &vector(2), &SearchParams::default())
        .unwrap();
    assert_eq!(hits[0].id, "w1");
    assert_eq!(store.collection_info("code").unwrap().ann.unwrap().vector_count, 2);
}

#[test]
fn test_watch_delete_updates_index() {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemVectorStore::open(&test_settings(&temp_dir)).unwrap();
    store.create_collection("code", DIM).unwrap();
    store
        .upsert_points(
            "code",
            vec![chunk("a", "a.py", 1), chunk("b", "b.py", 2)],
            WriteMode::Watch,
        )
        .unwrap();

    store
        .delete_points("code", &["a".to_string()], WriteMode::Watch)
        .unwrap();
    assert!(!store.is_index_stale("code").unwrap());
    let hits = store
        .search_by_vector("code", &vector(1), &SearchParams::default())
        .unwrap();
    assert!(hits.iter().all(|hit| hit.id != "a"));
}

#[test]
fn test_daemon_cache_is_updated_in_place() {
    let (store, _temp_dir) = daemon_store();
    store
        .upsert_points("code", vec![chunk("d0", "d.py", 1)], WriteMode::Watch)
        .unwrap();

    let cache = store.cached_index("code").unwrap();
    assert_eq!(cache.len(), Some(1));

    store
        .upsert_points(
            "code",
            vec![chunk("d1", "e.py", 2), chunk("d2", "f.py", 3)],
            WriteMode::Watch,
        )
        .unwrap();
    assert_eq!(cache.len(), Some(3));
    assert!(!store.is_index_stale("code").unwrap());

    // Re-indexing d.py with a new chunk id evicts the old one from the graph
    store
        .upsert_points("code", vec![chunk("d0b", "d.py", 4)], WriteMode::Watch)
        .unwrap();
    assert_eq!(cache.len(), Some(3));

    let hits = store
        .search_by_vector("code", &vector(4), &SearchParams::default())
        .unwrap();
    assert_eq!(hits[0].id, "d0b");
    assert!(hits.iter().all(|hit| hit.id != "d0"));
}

#[test]
fn test_daemon_reloads_after_deferred_session() {
    let (store, _temp_dir) = daemon_store();
    store.begin_indexing("code").unwrap();
    store
        .upsert_points("code", vec![chunk("s0", "s.py", 1)], WriteMode::Batch)
        .unwrap();
    store.end_indexing("code", true).unwrap();
    assert!(!store.cached_index("code").unwrap().is_loaded());

    let hits = store
        .search_by_vector("code", &vector(1), &SearchParams::default())
        .unwrap();
    assert_eq!(hits[0].id, "s0");
    assert!(store.cached_index("code").unwrap().is_loaded());
}

#[test]
fn test_concurrent_queries_share_cache() {
    let (store, _temp_dir) = daemon_store();
    let points = (0..16)
        .map(|i| chunk(&format!("c{i}"), &format!("c{i}.py"), i))
        .collect();
    store.begin_indexing("code").unwrap();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
    store.end_indexing("code", false).unwrap();

    let store = Arc::new(store);
    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let hits = store
                    .search_by_vector("code", &vector(i), &SearchParams::default())
                    .unwrap();
                hits[0].id.clone()
            })
        })
        .collect();
    let tops: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(tops, vec!["c0", "c1", "c2", "c3"]);
}

#[test]
fn test_daemon_queries_survive_concurrent_batch_writes() {
    let (store, _temp_dir) = daemon_store();
    let points = (0..20)
        .map(|i| chunk(&format!("r{i}"), &format!("r{i}.py"), i))
        .collect();
    store.upsert_points("code", points, WriteMode::Watch).unwrap();

    let store = Arc::new(store);
    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for i in 0..60u64 {
                let point = chunk(&format!("w{i}"), &format!("w{i}.py"), 100 + i);
                store
                    .upsert_points("code", vec![point], WriteMode::Batch)
                    .unwrap();
            }
        })
    };

    let mut queries = 0;
    while !writer.is_finished() || queries < 20 {
        let hits = store
            .search_by_vector("code", &vector(7), &SearchParams::default())
            .unwrap_or_else(|e| panic!("query {queries} failed during writes: {e}"));
        assert_eq!(hits[0].id, "r7");
        queries += 1;
    }
    writer.join().unwrap();

    let hits = store
        .search_by_vector("code", &vector(159), &SearchParams::default())
        .unwrap();
    assert_eq!(hits[0].id, "w59");
}
