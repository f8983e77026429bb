//! Settings files drive the store layout.

use codevec::config::{DistanceSpace, QuantizationStrategy};
use codevec::{FilesystemVectorStore, Settings, StoreError};
use tempfile::TempDir;

#[test]
fn test_toml_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &path,
        r#"
index_path = "/tmp/codevec-test-index"

[storage]
depth_factor = 2
quantization = "quartile"

[hnsw]
m = 8
space = "l2"

[git]
enabled = false
"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.storage.depth_factor, 2);
    assert_eq!(settings.storage.reduced_dim, 64);
    assert_eq!(settings.storage.quantization, QuantizationStrategy::Quartile);
    assert_eq!(settings.hnsw.m, 8);
    assert_eq!(settings.hnsw.space, DistanceSpace::L2);
    assert_eq!(settings.hnsw.ef_construction, 200);
    assert!(!settings.git.enabled);
}

#[test]
fn test_settings_round_trip_through_save() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("settings.toml");
    let mut settings = Settings::default();
    settings.search.default_limit = 25;
    settings.save(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.search.default_limit, 25);
}

#[test]
fn test_invalid_layout_is_rejected_at_open() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.git.enabled = false;
    settings.storage.reduced_dim = 63;
    assert!(matches!(
        FilesystemVectorStore::new(temp_dir.path(), &settings),
        Err(StoreError::Config { .. })
    ));
}

#[test]
fn test_quartile_collections_work_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = crate::common::test_settings(&temp_dir);
    settings.storage.quantization = QuantizationStrategy::Quartile;
    settings.storage.depth_factor = 2;
    let store = FilesystemVectorStore::open(&settings).unwrap();
    store.create_collection("code", crate::common::DIM).unwrap();

    let points = (0..8)
        .map(|i| crate::common::chunk(&format!("q{i}"), &format!("q{i}.py"), i))
        .collect();
    store
        .upsert_points("code", points, codevec::WriteMode::Watch)
        .unwrap();
    let hits = store
        .search_by_vector("code", &crate::common::vector(5), &Default::default())
        .unwrap();
    assert_eq!(hits[0].id, "q5");
}
