//! Classroom schedule job.
//!
//! Before the first partition every listed classroom is upserted. Then, per
//! classroom: the course codes and instructor names found in the grid are
//! made to exist, each cell is resolved into a session, and the classroom's
//! sessions are replaced wholesale.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PartitionJob, Resolved};
use crate::extract::{parse_grid, GridCell};
use crate::resolve::{EntityResolver, Resolution};
use crate::store::{Filter, Store};
use crate::sync::SyncWriter;
use crate::types::{tables, CourseSession, EntityKind, Partition, SyncError, SyncResult};

/// Option labels containing any of these are not real classrooms.
pub const EXCLUDED_LABELS: &[&str] = &["BALGAT", "TEST"];

/// Counters beyond the per-partition stats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleCounters {
    pub classrooms_upserted: usize,
    pub courses_upserted: usize,
    pub academics_created: usize,
    pub entity_errors: usize,
}

#[derive(Debug, Default)]
pub struct ScheduleJob {
    resolver: EntityResolver,
    counters: ScheduleCounters,
}

impl ScheduleJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &ScheduleCounters {
        &self.counters
    }

    /// Make every course and instructor named in the grid exist.
    async fn discover_entities(&mut self, store: &dyn Store, cells: &[GridCell]) {
        for cell in cells {
            if let Some(code) = cell.course_code() {
                match self
                    .resolver
                    .lookup_or_create(store, EntityKind::Course, &code)
                    .await
                {
                    Ok(Resolution::Upserted(_)) => self.counters.courses_upserted += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%code, "course upsert failed: {e}");
                        self.counters.entity_errors += 1;
                    }
                }
            }

            if let Some(name) = cell.academic_name() {
                match self
                    .resolver
                    .lookup_or_create(store, EntityKind::Academic, &name)
                    .await
                {
                    Ok(Resolution::Created(_)) => self.counters.academics_created += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%name, "academic lookup-or-create failed: {e}");
                        self.counters.entity_errors += 1;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PartitionJob for ScheduleJob {
    type Record = GridCell;
    type Row = CourseSession;

    fn name(&self) -> &'static str {
        "schedule"
    }

    fn accepts(&self, partition: &Partition) -> bool {
        !EXCLUDED_LABELS
            .iter()
            .any(|marker| partition.label.contains(marker))
    }

    async fn prepare(&mut self, store: &dyn Store, partitions: &[Partition]) -> SyncResult<()> {
        for partition in partitions {
            if !self.accepts(partition) {
                continue;
            }
            match self
                .resolver
                .lookup_or_create(store, EntityKind::Classroom, &partition.label)
                .await
            {
                Ok(Resolution::Upserted(_)) => self.counters.classrooms_upserted += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(classroom = %partition, "classroom upsert failed: {e}");
                    self.counters.entity_errors += 1;
                }
            }
        }
        Ok(())
    }

    fn extract(&mut self, _partition: &Partition, markup: &str) -> SyncResult<Vec<GridCell>> {
        parse_grid(markup)
    }

    async fn resolve(
        &mut self,
        store: &dyn Store,
        partition: &Partition,
        cells: Vec<GridCell>,
    ) -> SyncResult<Resolved<CourseSession>> {
        let classroom_id = self
            .resolver
            .resolve_classroom(store, &partition.label)
            .await?;

        self.discover_entities(store, &cells).await;

        let mut rows = Vec::new();
        let mut dropped = 0;
        for cell in &cells {
            let Some(candidate) = cell.to_session() else {
                debug!(classroom = %partition, day = cell.day, raw = %cell.raw, "cell is not a session");
                continue;
            };

            let course = self.resolver.resolve_course(store, &candidate.course_code).await;
            let instructor = self
                .resolver
                .resolve_instructor(store, &candidate.instructor)
                .await;

            match (course, instructor) {
                (Ok(course_id), Ok(instructor_id)) => rows.push(CourseSession {
                    course_id,
                    classroom_id: classroom_id.clone(),
                    instructor_id,
                    section: candidate.section,
                    day_of_week: candidate.day,
                    time: candidate.time,
                }),
                // Only a miss drops the session; any other error fails the
                // partition before its rows are replaced.
                (course, instructor) => {
                    for err in [course.err(), instructor.err()].into_iter().flatten() {
                        match err {
                            SyncError::ResolutionMiss { kind, key } => {
                                warn!(classroom = %partition, %kind, %key, "unresolved, session dropped")
                            }
                            other => return Err(other),
                        }
                    }
                    dropped += 1;
                }
            }
        }

        Ok(Resolved {
            scope: Filter::eq("classroom_id", classroom_id.0),
            rows,
            dropped,
        })
    }

    async fn write(
        &mut self,
        store: &dyn Store,
        _partition: &Partition,
        resolved: Resolved<CourseSession>,
    ) -> SyncResult<usize> {
        SyncWriter::new(store)
            .replace_partition(tables::COURSE_SESSIONS, &resolved.scope, &resolved.rows)
            .await
    }
}
