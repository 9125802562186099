//! Academic calendar job: a full-table refresh from a single page.

use async_trait::async_trait;
use tracing::warn;

use super::{PartitionJob, Resolved};
use crate::extract::parse_calendar;
use crate::store::{Filter, Store};
use crate::sync::SyncWriter;
use crate::types::{tables, CalendarEntry, Partition, SyncError, SyncResult};

#[derive(Debug)]
pub struct CalendarJob {
    chunk_size: usize,
}

impl CalendarJob {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

#[async_trait]
impl PartitionJob for CalendarJob {
    type Record = CalendarEntry;
    type Row = CalendarEntry;

    fn name(&self) -> &'static str {
        "calendar"
    }

    /// A calendar page without dated rows is treated as a broken page, not as
    /// an empty calendar.
    fn extract(&mut self, _partition: &Partition, markup: &str) -> SyncResult<Vec<CalendarEntry>> {
        let entries = parse_calendar(markup)?;
        if entries.is_empty() {
            return Err(SyncError::ParseAnomaly {
                context: "academic calendar".into(),
                reason: "no dated rows".into(),
            });
        }
        Ok(entries)
    }

    async fn resolve(
        &mut self,
        _store: &dyn Store,
        _partition: &Partition,
        entries: Vec<CalendarEntry>,
    ) -> SyncResult<Resolved<CalendarEntry>> {
        Ok(Resolved {
            scope: Filter::All,
            rows: entries,
            dropped: 0,
        })
    }

    async fn write(
        &mut self,
        store: &dyn Store,
        _partition: &Partition,
        resolved: Resolved<CalendarEntry>,
    ) -> SyncResult<usize> {
        let report = SyncWriter::new(store)
            .refresh_table(tables::ACADEMIC_CALENDAR, &resolved.rows, self.chunk_size)
            .await?;
        if report.failed_chunks > 0 {
            warn!(
                failed_chunks = report.failed_chunks,
                failed_rows = report.failed_rows,
                "calendar partially written"
            );
        }
        Ok(report.written)
    }
}
