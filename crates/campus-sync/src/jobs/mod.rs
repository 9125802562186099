//! Per-partition work driven by the orchestrator.
//!
//! A job turns one partition's markup into rows and writes them. The
//! orchestrator owns sequencing, retries and failure containment; a job only
//! sees one partition at a time, in source order.

pub mod calendar;
pub mod exams;
pub mod schedule;

use async_trait::async_trait;

use crate::store::{Filter, Store};
use crate::types::{Partition, SyncResult};

pub use calendar::CalendarJob;
pub use exams::ExamJob;
pub use schedule::ScheduleJob;

/// Rows ready to be written for one partition.
#[derive(Debug, Clone)]
pub struct Resolved<R> {
    /// Rows the partition owns in the target table.
    pub scope: Filter,
    pub rows: Vec<R>,
    /// Records dropped for unresolved references.
    pub dropped: usize,
}

#[async_trait]
pub trait PartitionJob: Send {
    /// Parsed, not yet resolved item.
    type Record: Send;
    /// Row written to the store.
    type Row: Send;

    fn name(&self) -> &'static str;

    /// Whether this partition is processed at all.
    fn accepts(&self, _partition: &Partition) -> bool {
        true
    }

    /// Runs once after the session is open, before the first partition.
    async fn prepare(&mut self, _store: &dyn Store, _partitions: &[Partition]) -> SyncResult<()> {
        Ok(())
    }

    /// Parse one partition's markup.
    fn extract(&mut self, partition: &Partition, markup: &str) -> SyncResult<Vec<Self::Record>>;

    /// Resolve references and build rows.
    async fn resolve(
        &mut self,
        store: &dyn Store,
        partition: &Partition,
        records: Vec<Self::Record>,
    ) -> SyncResult<Resolved<Self::Row>>;

    /// Write the partition's snapshot; returns rows written.
    async fn write(
        &mut self,
        store: &dyn Store,
        partition: &Partition,
        resolved: Resolved<Self::Row>,
    ) -> SyncResult<usize>;
}
