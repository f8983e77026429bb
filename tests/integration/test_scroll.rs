//! Paging through all points.

use crate::common::{chunk, create_test_store, payload, vector};
use codevec::{Filter, ScrollRequest, StoreError, VectorPoint, WriteMode};
use serde_json::json;
use std::collections::HashSet;

#[test]
fn test_pages_cover_every_point_once() {
    let (store, _temp_dir) = create_test_store();
    let points: Vec<VectorPoint> = (0..23)
        .map(|i| chunk(&format!("s{i}"), &format!("s{i}.py"), i))
        .collect();
    store.upsert_points("code", points, WriteMode::Batch).unwrap();

    let mut seen = HashSet::new();
    let mut request = ScrollRequest {
        limit: 10,
        ..ScrollRequest::default()
    };
    let mut pages = 0;
    loop {
        let page = store.scroll_points("code", &request).unwrap();
        pages += 1;
        for point in &page.points {
            assert!(seen.insert(point.id.clone()), "{} returned twice", point.id);
            assert!(point.payload.is_some());
            assert!(point.vector.is_none());
        }
        match page.next_offset {
            Some(offset) => request.offset = Some(offset),
            None => break,
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 23);
}

#[test]
fn test_scroll_with_vectors_and_filter() {
    let (store, _temp_dir) = create_test_store();
    let points = vec![
        VectorPoint::new("old", vector(1))
            .with_payload(payload(json!({"timestamp": "2023-01-01T00:00:00Z"})))
            .with_text("a"),
        VectorPoint::new("new", vector(2))
            .with_payload(payload(json!({"timestamp": "2024-06-01T00:00:00Z"})))
            .with_text("b"),
    ];
    store.upsert_points("code", points, WriteMode::Batch).unwrap();

    let filter = Filter::parse(&json!({
        "must": [{"key": "timestamp", "range": {"gte": "2024-01-01T00:00:00Z"}}]
    }))
    .unwrap();
    let request = ScrollRequest {
        with_vector: true,
        with_payload: false,
        filter: Some(filter),
        ..ScrollRequest::default()
    };
    let page = store.scroll_points("code", &request).unwrap();
    assert_eq!(page.points.len(), 1);
    assert_eq!(page.points[0].id, "new");
    assert_eq!(page.points[0].vector.as_deref(), Some(vector(2).as_slice()));
    assert!(page.points[0].payload.is_none());
    assert!(page.next_offset.is_none());
}

#[test]
fn test_scroll_skips_corrupt_records() {
    let (store, _temp_dir) = create_test_store();
    store
        .upsert_points(
            "code",
            vec![chunk("ok", "ok.py", 1), chunk("broken", "broken.py", 2)],
            WriteMode::Batch,
        )
        .unwrap();

    let dir = store.base_path().join("code");
    let broken = codevec::storage::scan_point_files(&dir)
        .into_iter()
        .find(|p| p.ends_with("vector_broken.json"))
        .unwrap();
    std::fs::write(broken, b"{ not json").unwrap();

    let page = store.scroll_points("code", &ScrollRequest::default()).unwrap();
    let ids: Vec<&str> = page.points.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
}

#[test]
fn test_zero_limit_is_rejected() {
    let (store, _temp_dir) = create_test_store();
    let request = ScrollRequest {
        limit: 0,
        ..ScrollRequest::default()
    };
    assert!(matches!(
        store.scroll_points("code", &request),
        Err(StoreError::InvalidArgument { .. })
    ));
}
