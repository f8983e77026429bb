//! Search ranking, thresholds, filters and the embedding seam.

use crate::common::{DIM, TableEmbedder, chunk, create_test_store, payload, vector};
use codevec::{
    FilesystemVectorStore, Filter, SearchParams, StoreError, VectorPoint, WriteMode,
};
use serde_json::json;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

fn three_points(store: &FilesystemVectorStore) {
    let points = vec![
        VectorPoint::new("A", unit(0)).with_text("alpha"),
        VectorPoint::new("B", unit(1)).with_text("beta"),
        VectorPoint::new("C", unit(2)).with_text("gamma"),
    ];
    store.begin_indexing("code").unwrap();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
    store.end_indexing("code", false).unwrap();
}

#[test]
fn test_identical_query_ranks_first() {
    let (store, _temp_dir) = create_test_store();
    three_points(&store);

    let hits = store
        .search_by_vector("code", &unit(0), &SearchParams::default())
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "A");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let content = hits[0].content.as_ref().unwrap();
    assert_eq!(content.text, "alpha");
    assert!(!content.is_stale());
}

#[test]
fn test_threshold_excludes_equidistant_points() {
    let (store, _temp_dir) = create_test_store();
    three_points(&store);

    let mut between = vec![0.0; DIM];
    between[1] = 1.0;
    between[2] = 1.0;
    let params = SearchParams {
        score_threshold: Some(0.99),
        ..SearchParams::default()
    };
    let hits = store.search_by_vector("code", &between, &params).unwrap();
    assert!(hits.is_empty());

    // Without the threshold B and C tie at ~0.707
    let hits = store
        .search_by_vector("code", &between, &SearchParams::default())
        .unwrap();
    let top: Vec<&str> = hits.iter().take(2).map(|h| h.id.as_str()).collect();
    assert_eq!(top, vec!["B", "C"]);
    assert!((hits[0].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
}

#[test]
fn test_limit_truncates_results() {
    let (store, _temp_dir) = create_test_store();
    let points: Vec<VectorPoint> = (0..30)
        .map(|i| chunk(&format!("p{i}"), &format!("f{i}.py"), i))
        .collect();
    store.begin_indexing("code").unwrap();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
    store.end_indexing("code", false).unwrap();

    let params = SearchParams {
        limit: 5,
        ..SearchParams::default()
    };
    let hits = store.search_by_vector("code", &vector(7), &params).unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].id, "p7");
}

#[test]
fn test_filter_applies_to_candidates() {
    let (store, _temp_dir) = create_test_store();
    let points = vec![
        VectorPoint::new("py", unit(0))
            .with_payload(payload(json!({"language": "python", "type": "content"})))
            .with_text("x"),
        VectorPoint::new("py_test", unit(0))
            .with_payload(payload(json!({"language": "python", "type": "test"})))
            .with_text("y"),
        VectorPoint::new("rs", unit(0))
            .with_payload(payload(json!({"language": "rust", "type": "content"})))
            .with_text("z"),
    ];
    store.begin_indexing("code").unwrap();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();
    store.end_indexing("code", false).unwrap();

    let filter = Filter::parse(&json!({
        "must": [{"key": "language", "match": {"value": "python"}}],
        "must_not": [{"key": "type", "match": {"value": "test"}}]
    }))
    .unwrap();
    let params = SearchParams {
        filter: Some(filter),
        ..SearchParams::default()
    };
    let hits = store.search_by_vector("code", &unit(0), &params).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["py"]);
}

#[test]
fn test_text_search_uses_provider() {
    let (store, _temp_dir) = create_test_store();
    three_points(&store);

    let provider = TableEmbedder::default().with("second letter", unit(1));
    let hits = store
        .search("code", "second letter", &provider, &SearchParams::default())
        .unwrap();
    assert_eq!(hits[0].id, "B");

    let failure = store.search("code", "unknown", &provider, &SearchParams::default());
    assert!(matches!(failure, Err(StoreError::Embedding(_))));
}

#[test]
fn test_empty_collection_returns_no_hits() {
    let (store, _temp_dir) = create_test_store();
    let hits = store
        .search_by_vector("code", &unit(0), &SearchParams::default())
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_wrong_query_dimension() {
    let (store, _temp_dir) = create_test_store();
    three_points(&store);
    let result = store.search_by_vector("code", &[1.0, 0.0], &SearchParams::default());
    assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
}

#[test]
fn test_skip_content() {
    let (store, _temp_dir) = create_test_store();
    three_points(&store);
    let params = SearchParams {
        skip_content: true,
        ..SearchParams::default()
    };
    let hits = store.search_by_vector("code", &unit(2), &params).unwrap();
    assert_eq!(hits[0].id, "C");
    assert!(hits[0].content.is_none());
}
