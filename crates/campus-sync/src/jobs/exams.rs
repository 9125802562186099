//! Exam listing job: one department per partition.
//!
//! A department owns every exam whose code starts with the department code.
//! Exam ids are `<dept>-<run stamp>-<counter>`, the counter running across
//! the whole run, so ids are unique within a run and change between runs.

use async_trait::async_trait;
use chrono::Utc;

use super::{PartitionJob, Resolved};
use crate::extract::{parse_exam_listing, ExamListing};
use crate::store::{Filter, Store};
use crate::sync::SyncWriter;
use crate::types::{tables, Exam, Partition, SyncResult};

/// Exam listings for one department per partition.
///
/// The write scope is every exam whose code starts with the department
/// code. A department whose code prefixes another's (`ME` and `MECH`)
/// therefore also deletes the longer department's exams; when the shorter
/// one is processed later in the run, the rows just written for the longer
/// one are lost until the next run.
#[derive(Debug)]
pub struct ExamJob {
    run_stamp: i64,
    counter: u64,
}

impl ExamJob {
    pub fn new() -> Self {
        Self::with_stamp(Utc::now().timestamp_millis())
    }

    /// Job with a fixed run stamp.
    pub fn with_stamp(run_stamp: i64) -> Self {
        Self {
            run_stamp,
            counter: 0,
        }
    }

    fn next_id(&mut self, department: &str) -> String {
        self.counter += 1;
        format!("{department}-{}-{}", self.run_stamp, self.counter)
    }
}

impl Default for ExamJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionJob for ExamJob {
    type Record = ExamListing;
    type Row = Exam;

    fn name(&self) -> &'static str {
        "exams"
    }

    fn extract(&mut self, _partition: &Partition, markup: &str) -> SyncResult<Vec<ExamListing>> {
        parse_exam_listing(markup)
    }

    async fn resolve(
        &mut self,
        _store: &dyn Store,
        partition: &Partition,
        listings: Vec<ExamListing>,
    ) -> SyncResult<Resolved<Exam>> {
        let department = partition.value.as_str();
        let rows = listings
            .into_iter()
            .map(|l| Exam {
                id: self.next_id(department),
                code: l.code,
                section: l.section,
                exam: l.exam,
                date: l.date,
                starting: l.starting,
                duration: l.duration,
                hall: l.hall,
            })
            .collect();

        Ok(Resolved {
            scope: Filter::ilike("code", format!("{department}%")),
            rows,
            dropped: 0,
        })
    }

    async fn write(
        &mut self,
        store: &dyn Store,
        _partition: &Partition,
        resolved: Resolved<Exam>,
    ) -> SyncResult<usize> {
        SyncWriter::new(store)
            .replace_partition(tables::EXAMS, &resolved.scope, &resolved.rows)
            .await
    }
}
