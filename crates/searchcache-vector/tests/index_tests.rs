use std::fs;
use std::path::{Path, PathBuf};

use searchcache_vector::{normalize, CacheIndex, FlatIndex, IndexError, IndexMapping};

const DIM: usize = 8;

/// Deterministic pseudo-random unit vectors (xorshift), no rand dependency needed.
fn unit_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            let raw: Vec<f32> = (0..DIM)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    ((state % 2000) as f32 / 1000.0) - 1.0
                })
                .collect();
            normalize(&raw).expect("non-degenerate")
        })
        .collect()
}

#[test]
fn normalize_rejects_degenerate_vectors() {
    assert!(normalize(&[]).is_none());
    assert!(normalize(&[0.0, 0.0, 0.0]).is_none());
    assert!(normalize(&[1.0, f32::NAN]).is_none());
    assert!(normalize(&[f32::INFINITY, 1.0]).is_none());

    let v = normalize(&[3.0, 4.0]).expect("unit");
    assert!((v[0] - 0.6).abs() < 1e-6);
    assert!((v[1] - 0.8).abs() < 1e-6);
}

#[test]
fn append_assigns_sequential_row_ids() {
    let mut index = FlatIndex::new(DIM);
    assert!(index.is_empty());
    for (i, v) in unit_vectors(5, 7).iter().enumerate() {
        assert_eq!(index.append(v).expect("append"), i as u64);
    }
    assert_eq!(index.len(), 5);
}

#[test]
fn append_and_search_reject_wrong_dimension() {
    let mut index = FlatIndex::new(DIM);
    assert!(matches!(
        index.append(&[1.0, 0.0]),
        Err(IndexError::DimensionMismatch {
            expected: 8,
            actual: 2
        })
    ));
    assert!(index.is_empty());
    assert!(matches!(
        index.search_top1(&[1.0]),
        Err(IndexError::DimensionMismatch { .. })
    ));
}

#[test]
fn search_on_empty_index_is_none() {
    let index = FlatIndex::new(DIM);
    let query = &unit_vectors(1, 3)[0];
    assert_eq!(index.search_top1(query).expect("search"), None);
}

#[test]
fn search_finds_exact_vector() {
    let vectors = unit_vectors(20, 11);
    let mut index = FlatIndex::new(DIM);
    for v in &vectors {
        index.append(v).expect("append");
    }
    let hit = index.search_top1(&vectors[13]).expect("search").expect("hit");
    assert_eq!(hit.row_id, 13);
    assert!((hit.score - 1.0).abs() < 1e-5);
}

#[test]
fn ties_keep_lowest_row() {
    let mut index = FlatIndex::new(2);
    index.append(&[1.0, 0.0]).expect("append");
    index.append(&[1.0, 0.0]).expect("append");
    let hit = index.search_top1(&[1.0, 0.0]).expect("search").expect("hit");
    assert_eq!(hit.row_id, 0);
}

#[test]
fn search_excluding_skips_rows() {
    let mut index = FlatIndex::new(2);
    index.append(&[1.0, 0.0]).expect("append");
    index.append(&[0.0, 1.0]).expect("append");
    let hit = index
        .search_top1_excluding(&[1.0, 0.0], |row| row == 0)
        .expect("search")
        .expect("hit");
    assert_eq!(hit.row_id, 1);
    let none = index.search_top1_excluding(&[1.0, 0.0], |_| true).expect("search");
    assert!(none.is_none());
}

#[test]
fn save_load_round_trip_is_exact() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("index.idx");
    let vectors = unit_vectors(50, 42);
    let mut index = FlatIndex::new(DIM);
    for v in &vectors {
        index.append(v).expect("append");
    }
    index.save(&path).expect("save");

    let loaded = FlatIndex::load(&path, DIM).expect("load");
    assert_eq!(loaded, index);
    for query in unit_vectors(10, 99) {
        let a = index.search_top1(&query).expect("search");
        let b = loaded.search_top1(&query).expect("search");
        assert_eq!(a, b);
    }
    assert_eq!(loaded.vector(49), index.vector(49));
}

#[test]
fn load_rejects_truncated_and_foreign_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("index.idx");
    let mut index = FlatIndex::new(DIM);
    for v in unit_vectors(4, 5) {
        index.append(&v).expect("append");
    }
    index.save(&path).expect("save");

    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");
    assert!(matches!(
        FlatIndex::load(&path, DIM),
        Err(IndexError::Corrupt { .. })
    ));
    assert!(FlatIndex::load_or_empty(&path, DIM).is_empty());

    fs::write(&path, b"not an index at all").expect("write");
    assert!(FlatIndex::load(&path, DIM).is_err());

    let missing = tmp.path().join("missing.idx");
    assert!(matches!(
        FlatIndex::load(&missing, DIM),
        Err(IndexError::Io { .. })
    ));
    assert!(FlatIndex::load_or_empty(&missing, DIM).is_empty());
}

#[test]
fn load_rejects_dimension_change() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("index.idx");
    let mut index = FlatIndex::new(DIM);
    index.append(&unit_vectors(1, 8)[0]).expect("append");
    index.save(&path).expect("save");
    assert!(matches!(
        FlatIndex::load(&path, DIM * 2),
        Err(IndexError::Corrupt { .. })
    ));
}

fn entry(name: &str) -> PathBuf {
    PathBuf::from(format!("/c/{name}.json"))
}

fn paths(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join("i.idx"), dir.join("m.json"))
}

#[test]
fn mapping_json_layout() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    cache.append(&[1.0, 0.0], "who won the ipl final", &entry("aa")).expect("append");
    cache.append(&[0.0, 1.0], "live score ind vs aus", &entry("bb")).expect("append");
    cache.retire(1);
    cache.save().expect("save");

    let text = fs::read_to_string(&map).expect("read");
    let json: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(json["next_id"], 2);
    assert_eq!(json["mapping"]["0"][0], "who won the ipl final");
    assert_eq!(json["mapping"]["0"][1], "/c/aa.json");
    assert!(json["mapping"]["1"][1].is_null());
    assert!(!tmp.path().join("m.json.tmp").exists());
}

#[test]
fn mapping_reads_string_keys() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("m.json");
    fs::write(&path, r#"{"next_id": 1, "mapping": {"0": ["q", "/c/x.json"]}}"#).expect("write");
    let mapping = IndexMapping::load(&path).expect("load");
    assert_eq!(mapping.len(), 1);
    let record = mapping.get(0).expect("record");
    assert_eq!(record.original_query, "q");
    assert_eq!(record.storage_path, Some(PathBuf::from("/c/x.json")));
}

#[test]
fn mapping_insert_never_overwrites() {
    let mut mapping = IndexMapping::new();
    mapping.insert(0, "first", &entry("a")).expect("insert");
    assert!(matches!(
        mapping.insert(0, "second", &entry("b")),
        Err(IndexError::RowTaken { row_id: 0 })
    ));
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping.next_id(), 1);
    assert_eq!(mapping.get(0).expect("record").original_query, "first");
}

#[test]
fn mapping_covers_rows_only_for_dense_keys() {
    let mut mapping = IndexMapping::new();
    assert!(mapping.covers_rows(0));
    mapping.insert(0, "a", &entry("a")).expect("insert");
    mapping.insert(2, "c", &entry("c")).expect("insert");
    assert!(!mapping.covers_rows(2));
    assert!(!mapping.covers_rows(3));
    mapping.insert(1, "b", &entry("b")).expect("insert");
    assert!(mapping.covers_rows(3));
}

#[test]
fn cache_index_round_trip() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = (tmp.path().join("sub/i.idx"), tmp.path().join("sub/m.json"));
    let vectors = unit_vectors(6, 17);
    let mut cache = CacheIndex::empty(&idx, &map, DIM);
    for (i, v) in vectors.iter().enumerate() {
        let query = format!("query {i}");
        cache.append(v, &query, &entry(&i.to_string())).expect("append");
    }
    cache.save().expect("save");

    let reopened = CacheIndex::open(&idx, &map, DIM);
    assert_eq!(reopened.len(), 6);
    assert_eq!(reopened.mapping_len(), 6);
    assert_eq!(reopened.record(3).expect("record").original_query, "query 3");
    for query in &vectors {
        assert_eq!(
            cache.search_top1(query).expect("search"),
            reopened.search_top1(query).expect("search")
        );
    }
}

#[test]
fn cache_index_retired_rows_are_not_searchable() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    cache.append(&[1.0, 0.0], "a", &entry("a")).expect("append");
    cache.append(&[0.6, 0.8], "b", &entry("b")).expect("append");
    assert!(cache.retire(0));
    assert!(!cache.retire(0), "already retired");
    assert!(!cache.retire(9), "unknown row");

    let hit = cache.search_top1(&[1.0, 0.0]).expect("search").expect("hit");
    assert_eq!(hit.row_id, 1);
    assert_eq!(cache.len(), cache.mapping_len());
    assert_eq!(cache.live_len(), 1);
    assert!(cache.record(0).expect("record").is_retired());
}

#[test]
fn cache_index_retired_row_survives_reopen() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    cache.append(&[1.0, 0.0], "a", &entry("a")).expect("append");
    cache.append(&[0.6, 0.8], "b", &entry("b")).expect("append");
    cache.retire(0);
    cache.save().expect("save");

    let reopened = CacheIndex::open(&idx, &map, 2);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.mapping_len(), 2);
    assert_eq!(reopened.retired_len(), 1);
    assert!(reopened.record(0).expect("record").is_retired());
    let hit = reopened.search_top1(&[1.0, 0.0]).expect("search").expect("hit");
    assert_eq!(hit.row_id, 1);
}

#[test]
fn cache_index_append_failure_changes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    assert!(cache.append(&[1.0, 0.0, 0.0], "bad", &entry("bad")).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.mapping_len(), 0);
}

#[test]
fn cache_index_mismatch_resets() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    cache.append(&[1.0, 0.0], "a", &entry("a")).expect("append");
    cache.append(&[0.0, 1.0], "b", &entry("b")).expect("append");
    cache.save().expect("save");

    fs::write(&map, r#"{"next_id": 1, "mapping": {"0": ["a", "/c/a.json"]}}"#).expect("write");
    let reopened = CacheIndex::open(&idx, &map, 2);
    assert!(reopened.is_empty());
    assert_eq!(reopened.mapping_len(), 0);
}

#[test]
fn cache_index_rows_out_of_step_reset() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut index = FlatIndex::new(2);
    index.append(&[1.0, 0.0]).expect("append");
    index.save(&idx).expect("save");
    // Same count as the index, but the record is for row 1.
    fs::write(&map, r#"{"next_id": 2, "mapping": {"1": ["a", "/c/a.json"]}}"#).expect("write");

    let mut cache = CacheIndex::open(&idx, &map, 2);
    assert!(cache.is_empty());
    assert_eq!(cache.mapping_len(), 0);

    assert_eq!(cache.append(&[0.0, 1.0], "b", &entry("b")).expect("append"), 0);
    assert_eq!(cache.len(), cache.mapping_len());
    cache.save().expect("save");

    let reopened = CacheIndex::open(&idx, &map, 2);
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.mapping_len(), 1);
    assert_eq!(reopened.record(0).expect("record").original_query, "b");
}

#[test]
fn cache_index_next_id_drift_keeps_rows() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let mut cache = CacheIndex::empty(&idx, &map, 2);
    cache.append(&[1.0, 0.0], "a", &entry("a")).expect("append");
    cache.append(&[0.0, 1.0], "b", &entry("b")).expect("append");
    cache.save().expect("save");

    let drifted = serde_json::json!({
        "next_id": 7,
        "mapping": { "0": ["a", "/c/a.json"], "1": ["b", "/c/b.json"] }
    });
    fs::write(&map, drifted.to_string()).expect("write");

    let mut reopened = CacheIndex::open(&idx, &map, 2);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.mapping_len(), 2);
    assert_eq!(reopened.record(1).expect("record").original_query, "b");
    let hit = reopened.search_top1(&[0.0, 1.0]).expect("search").expect("hit");
    assert_eq!(hit.row_id, 1);
    // New rows still follow the index size.
    assert_eq!(reopened.append(&[0.6, 0.8], "c", &entry("c")).expect("append"), 2);
}

#[test]
fn cache_index_missing_or_corrupt_index_is_cold() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    fs::write(&map, r#"{"next_id": 1, "mapping": {"0": ["a", "/c/a.json"]}}"#).expect("write");
    let cold = CacheIndex::open(&idx, &map, 2);
    assert!(cold.is_empty());

    fs::write(&idx, [0u8, 1, 2]).expect("write");
    let cold = CacheIndex::open(&idx, &map, 2);
    assert!(cold.is_empty());
    assert!(cold.search_top1(&[1.0, 0.0]).expect("search").is_none());
}

#[test]
fn cache_index_empty_save_writes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (idx, map) = paths(tmp.path());
    let cache = CacheIndex::empty(&idx, &map, 2);
    cache.save().expect("save");
    assert!(!idx.exists());
    assert!(!map.exists());
}
