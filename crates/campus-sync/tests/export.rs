//! JSON export into a scratch directory.

use std::fs;

use serde_json::{json, Value};

use campus_sync::export::{export_table_list, export_tables, FALLBACK_TABLES};
use campus_sync::store::{MemoryStore, StoreOp};
use campus_sync::types::tables;

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        tables::EXAMS,
        vec![
            json!({"id": "CENG-1-2", "code": "CENG 102"}),
            json!({"id": "CENG-1-1", "code": "CENG 101"}),
        ],
    );
    store.seed(tables::COURSES, vec![json!({"course_code": "CENG 101"})]);
    store.seed("rag_sources", vec![json!({"url": "https://example.com"})]);
    store
}

#[tokio::test]
async fn test_export_writes_one_file_per_listed_table() {
    let store = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stale.json"), "[1]").unwrap();
    fs::write(dir.path().join("README.txt"), "keep").unwrap();

    let report = export_tables(&store, dir.path()).await.unwrap();

    assert_eq!(report.purged, 1);
    assert!(report.failed.is_empty());
    assert_eq!(
        report.written,
        vec![("courses".to_string(), 1), ("exams".to_string(), 2)]
    );
    assert!(!dir.path().join("stale.json").exists());
    assert!(!dir.path().join("rag_sources.json").exists());
    assert!(dir.path().join("README.txt").exists());

    let body = fs::read_to_string(dir.path().join("exams.json")).unwrap();
    let rows: Vec<Value> = serde_json::from_str(&body).unwrap();
    // Ordered by id.
    assert_eq!(rows[0]["code"], "CENG 101");
    assert_eq!(rows[1]["code"], "CENG 102");
    assert!(body.contains("\n  "));
}

#[tokio::test]
async fn test_export_continues_past_failed_table() {
    let store = seeded_store();
    store.fail_next(tables::COURSES, StoreOp::Select);
    let dir = tempfile::tempdir().unwrap();

    let report = export_tables(&store, dir.path()).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "courses");
    assert!(!dir.path().join("courses.json").exists());
    assert!(dir.path().join("exams.json").exists());
}

#[tokio::test]
async fn test_empty_store_exports_fallback_tables() {
    let store = MemoryStore::new();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("nested").join("data");

    let report = export_tables(&store, &dir).await.unwrap();

    assert_eq!(report.written.len(), FALLBACK_TABLES.len());
    let empty = fs::read_to_string(dir.join("academic_calendar.json")).unwrap();
    assert_eq!(empty.trim(), "[]");
}

#[tokio::test]
async fn test_table_list_excludes_internal_tables() {
    let listed = export_table_list(&seeded_store()).await;
    assert_eq!(listed, vec!["courses", "exams"]);

    let fallback = export_table_list(&MemoryStore::new()).await;
    assert!(fallback.iter().any(|t| t == "course_sessions"));
}
