//! Fixed pipelines, one per subcommand.

use std::path::Path;

use crate::export::{export_tables, ExportReport};
use crate::http::HttpClient;
use crate::jobs::{CalendarJob, ExamJob, ScheduleJob};
use crate::orchestrator::{Orchestrator, RunContext, RunStats};
use crate::portal::{CalendarPortal, ExamPortal, SchedulePortal};
use crate::progress::ProgressSender;
use crate::types::SyncResult;

fn orchestrator<'a>(
    ctx: &'a RunContext,
    delay: std::time::Duration,
    progress: Option<ProgressSender>,
) -> Orchestrator<'a> {
    let orchestrator = Orchestrator::new(ctx, delay);
    match progress {
        Some(tx) => orchestrator.with_progress(tx),
        None => orchestrator,
    }
}

/// Classrooms, courses, academics and weekly sessions.
pub async fn run_schedule(
    ctx: &RunContext,
    progress: Option<ProgressSender>,
) -> SyncResult<RunStats> {
    let portal = SchedulePortal::new(
        HttpClient::new()?,
        ctx.config.urls.schedule.clone(),
        ctx.config.retry.base_timeout,
    );
    let mut job = ScheduleJob::new();
    let stats = orchestrator(ctx, ctx.config.schedule_delay, progress)
        .run(portal, &mut job)
        .await?;

    let counters = job.counters();
    tracing::info!(
        classrooms = counters.classrooms_upserted,
        courses = counters.courses_upserted,
        academics_created = counters.academics_created,
        entity_errors = counters.entity_errors,
        "schedule entities"
    );
    Ok(stats)
}

/// Exam listings, one department at a time.
pub async fn run_exams(ctx: &RunContext, progress: Option<ProgressSender>) -> SyncResult<RunStats> {
    let portal = ExamPortal::new(
        HttpClient::new()?,
        ctx.config.urls.exam_list.clone(),
        ctx.config.urls.exam_table.clone(),
        ctx.config.retry.base_timeout,
    )?;
    let mut job = ExamJob::new();
    orchestrator(ctx, ctx.config.exam_delay, progress)
        .run(portal, &mut job)
        .await
}

/// Full refresh of the academic calendar.
pub async fn run_calendar(
    ctx: &RunContext,
    progress: Option<ProgressSender>,
) -> SyncResult<RunStats> {
    let portal = CalendarPortal::new(HttpClient::new()?, ctx.config.urls.calendar.clone());
    let mut job = CalendarJob::new(ctx.config.calendar_chunk_size);
    orchestrator(ctx, std::time::Duration::ZERO, progress)
        .run(portal, &mut job)
        .await
}

/// Dump every table into `dir`, or the configured export directory.
pub async fn run_export(ctx: &RunContext, dir: Option<&Path>) -> SyncResult<ExportReport> {
    let dir = dir.unwrap_or(ctx.config.export_dir.as_path());
    export_tables(ctx.store.as_ref(), dir).await
}
