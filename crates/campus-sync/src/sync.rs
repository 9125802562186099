//! Snapshot writes against the store.
//!
//! A partition is replaced by deleting every row in its scope and inserting
//! the fresh snapshot. If the delete fails the insert is never attempted, so
//! the previous rows survive. If the insert fails after a successful delete
//! the scope stays empty until the next successful run; that is reported as
//! an error and never retried here.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::store::{Filter, Store};
use crate::types::SyncResult;

/// Outcome of a chunked full-table refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub written: usize,
    pub failed_rows: usize,
    pub failed_chunks: usize,
}

pub struct SyncWriter<'a> {
    store: &'a dyn Store,
}

impl<'a> SyncWriter<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    fn to_rows<T: Serialize>(rows: &[T]) -> SyncResult<Vec<Value>> {
        rows.iter()
            .map(|r| serde_json::to_value(r).map_err(Into::into))
            .collect()
    }

    /// Replace every row of `table` matching `scope` with `rows`.
    ///
    /// Returns the number of rows written. An empty snapshot clears the scope.
    pub async fn replace_partition<T: Serialize>(
        &self,
        table: &str,
        scope: &Filter,
        rows: &[T],
    ) -> SyncResult<usize> {
        let values = Self::to_rows(rows)?;

        if let Err(e) = self.store.delete(table, scope).await {
            warn!(table, ?scope, "delete failed, keeping previous rows");
            return Err(e.into());
        }

        if values.is_empty() {
            debug!(table, ?scope, "scope cleared, empty snapshot");
            return Ok(0);
        }

        let count = values.len();
        match self.store.insert(table, values).await {
            Ok(_) => {
                debug!(table, count, "snapshot written");
                Ok(count)
            }
            Err(e) => {
                error!(table, ?scope, count, "insert failed after delete, scope left empty");
                Err(e.into())
            }
        }
    }

    /// Insert-or-update one row on its natural key.
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        row: &T,
        conflict_key: &str,
    ) -> SyncResult<Vec<Value>> {
        let value = serde_json::to_value(row)?;
        Ok(self.store.upsert(table, value, conflict_key).await?)
    }

    /// Replace a whole table, inserting in chunks of `chunk_size`.
    ///
    /// A failed delete aborts before any insert. A failed chunk is logged and
    /// counted; later chunks are still written.
    pub async fn refresh_table<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
        chunk_size: usize,
    ) -> SyncResult<RefreshReport> {
        let values = Self::to_rows(rows)?;

        if let Err(e) = self.store.delete(table, &Filter::All).await {
            warn!(table, "delete failed, keeping previous rows");
            return Err(e.into());
        }

        let mut report = RefreshReport::default();
        for (index, chunk) in values.chunks(chunk_size.max(1)).enumerate() {
            match self.store.insert(table, chunk.to_vec()).await {
                Ok(_) => report.written += chunk.len(),
                Err(e) => {
                    error!(table, chunk = index, rows = chunk.len(), "chunk insert failed: {e}");
                    report.failed_chunks += 1;
                    report.failed_rows += chunk.len();
                }
            }
        }
        Ok(report)
    }
}
