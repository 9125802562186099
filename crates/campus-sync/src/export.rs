//! JSON export of the store's tables.
//!
//! Writes one pretty-printed `<table>.json` array per table into a directory
//! whose previous `.json` files are removed first. The table list comes from
//! the store when it can list tables, otherwise from a fixed list.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::store::{Filter, Order, Store};
use crate::types::SyncResult;

/// Tables never exported.
pub const EXCLUDED_TABLES: &[&str] = &["rag_sources"];

/// Tables exported when the store cannot list its own.
pub const FALLBACK_TABLES: &[&str] = &[
    "pins",
    "types",
    "classes",
    "offices",
    "foods",
    "polygons",
    "widgets",
    "stops",
    "routes",
    "exams",
    "academic_calendar",
    "academics",
    "courses",
    "course_sessions",
    "classrooms",
];

/// Result of one export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// `(table, row count)` for every file written.
    pub written: Vec<(String, usize)>,
    /// `(table, error)` for every table skipped.
    pub failed: Vec<(String, String)>,
    pub purged: usize,
}

/// Tables to export, in order.
pub async fn export_table_list(store: &dyn Store) -> Vec<String> {
    let listed = match store.list_tables().await {
        Ok(Some(tables)) if !tables.is_empty() => Some(tables),
        Ok(_) => None,
        Err(e) => {
            warn!("table listing failed: {e}");
            None
        }
    };

    match listed {
        Some(tables) => {
            info!(count = tables.len(), "table list from store");
            tables
                .into_iter()
                .filter(|t| !EXCLUDED_TABLES.contains(&t.as_str()))
                .collect()
        }
        None => {
            info!("store cannot list tables, using fallback list");
            FALLBACK_TABLES.iter().map(|t| t.to_string()).collect()
        }
    }
}

/// Remove every `*.json` file directly inside `dir`, creating `dir` if needed.
pub fn purge_json(dir: &Path) -> SyncResult<usize> {
    std::fs::create_dir_all(dir)?;

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// A table name usable as a file stem.
fn export_path(dir: &Path, table: &str) -> Option<PathBuf> {
    let safe = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    safe.then(|| dir.join(format!("{table}.json")))
}

/// Export every table into `dir`.
///
/// Per-table failures are logged and reported; only directory errors fail
/// the whole export.
pub async fn export_tables(store: &dyn Store, dir: &Path) -> SyncResult<ExportReport> {
    let tables = export_table_list(store).await;
    let mut report = ExportReport {
        purged: purge_json(dir)?,
        ..ExportReport::default()
    };
    info!(dir = %dir.display(), purged = report.purged, "old exports removed");

    for table in tables {
        let Some(path) = export_path(dir, &table) else {
            warn!(%table, "table name not usable as a file name, skipped");
            report.failed.push((table, "invalid table name".into()));
            continue;
        };

        let rows = match store.select(&table, &Filter::All, Some(&Order::asc("id"))).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(%table, "export failed: {e}");
                report.failed.push((table, e.to_string()));
                continue;
            }
        };

        let body = serde_json::to_string_pretty(&rows)?;
        std::fs::write(&path, body)?;
        info!(%table, rows = rows.len(), "exported");
        report.written.push((table, rows.len()));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_path_rejects_traversal() {
        let dir = Path::new("data");
        assert_eq!(
            export_path(dir, "course_sessions"),
            Some(PathBuf::from("data/course_sessions.json"))
        );
        assert_eq!(export_path(dir, "../etc"), None);
        assert_eq!(export_path(dir, ""), None);
    }

    #[test]
    fn test_purge_only_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exams.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(purge_json(dir.path()).unwrap(), 1);
        assert!(!dir.path().join("exams.json").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
