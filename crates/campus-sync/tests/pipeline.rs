//! End-to-end runs of the orchestrator against a scripted portal and the
//! in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use campus_sync::http::FetchFault;
use campus_sync::jobs::{CalendarJob, ExamJob, ScheduleJob};
use campus_sync::portal::Portal;
use campus_sync::progress::{self, PartitionState, ProgressEventKind};
use campus_sync::store::{MemoryStore, StoreOp};
use campus_sync::types::tables;
use campus_sync::{Orchestrator, Partition, RetryPolicy, RunConfig, RunContext, SyncError, SyncResult};

// ─────────────────────── helpers ───────────────────────

/// What the scripted portal observed.
#[derive(Default)]
struct PortalLog {
    submits: Vec<(String, Duration)>,
    closed: bool,
}

/// Portal serving fixed markup per partition value; a value with no page
/// fails every attempt with a timeout.
struct ScriptedPortal {
    partitions: Vec<Partition>,
    pages: HashMap<String, String>,
    unreachable: bool,
    log: Arc<Mutex<PortalLog>>,
}

impl ScriptedPortal {
    fn new(partitions: &[(&str, &str)], pages: &[(&str, String)]) -> (Self, Arc<Mutex<PortalLog>>) {
        let log = Arc::new(Mutex::new(PortalLog::default()));
        let portal = Self {
            partitions: partitions
                .iter()
                .map(|(value, label)| Partition::new(*value, *label))
                .collect(),
            pages: pages
                .iter()
                .map(|(value, page)| (value.to_string(), page.clone()))
                .collect(),
            unreachable: false,
            log: Arc::clone(&log),
        };
        (portal, log)
    }
}

#[async_trait]
impl Portal for ScriptedPortal {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&mut self) -> SyncResult<Vec<Partition>> {
        if self.unreachable {
            return Err(SyncError::Connectivity {
                url: "https://portal.invalid".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.partitions.clone())
    }

    async fn submit(&mut self, partition: &Partition, timeout: Duration) -> Result<String, FetchFault> {
        self.log
            .lock()
            .unwrap()
            .submits
            .push((partition.value.clone(), timeout));
        self.pages
            .get(&partition.value)
            .cloned()
            .ok_or(FetchFault::Timeout(timeout))
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

fn context(store: Arc<MemoryStore>) -> RunContext {
    let config = RunConfig {
        retry: RetryPolicy {
            max_retries: 5,
            base_timeout: Duration::from_millis(10),
            reset_wait: Duration::ZERO,
            backoff_step: Duration::ZERO,
        },
        ..RunConfig::default()
    };
    RunContext::new(store, config)
}

fn exam_page(rows: &[(&str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(code, date)| {
            format!(
                "<tr><td>{code}</td><td>1</td><td>Midterm</td><td>{date}</td><td>09:30</td><td>90</td><td>Amfi1<br>Amfi2</td></tr>"
            )
        })
        .collect();
    format!(
        "<html><body><table><tr><td>Ders Kod</td><td>Şube</td><td>Sınav</td><td>Tarih</td><td>Saat</td><td>Süre</td><td>Salon</td></tr>{body}</table></body></html>"
    )
}

fn grid_page(cells: &[&str]) -> String {
    let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
    format!(
        r#"<html><body><table id="GridView1"><tr><th>Saat</th><th>Pzt</th><th>Salı</th></tr><tr><td>08:20/09:10</td>{tds}</tr></table></body></html>"#
    )
}

// ─────────────────────── exams ───────────────────────

#[tokio::test]
async fn test_exam_run_replaces_department_rows() {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        tables::EXAMS,
        vec![
            json!({"id": "CENG-1-1", "code": "CENG 999"}),
            json!({"id": "MATH-1-2", "code": "MATH 101"}),
        ],
    );
    let ctx = context(Arc::clone(&store));

    let (portal, log) = ScriptedPortal::new(
        &[("CENG", "CENG")],
        &[("CENG", exam_page(&[("CENG 101", "12.11.2025"), ("CENG 102", "13.11.2025")]))],
    );
    let mut job = ExamJob::with_stamp(42);
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut job)
        .await
        .unwrap();

    assert_eq!(stats.partitions_done, 1);
    assert_eq!(stats.records_written, 2);

    let codes: Vec<String> = store
        .rows(tables::EXAMS)
        .iter()
        .map(|r| r["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["MATH 101", "CENG 101", "CENG 102"]);

    let exams = store.rows(tables::EXAMS);
    assert_eq!(exams[1]["id"], "CENG-42-1");
    assert_eq!(exams[1]["hall"], "Amfi1 Amfi2");
    assert!(log.lock().unwrap().closed);
}

#[tokio::test]
async fn test_failed_fetch_keeps_rows_and_run_continues() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::EXAMS, vec![json!({"id": "CENG-1-1", "code": "CENG 101"})]);
    let ctx = context(Arc::clone(&store));

    let (portal, log) = ScriptedPortal::new(
        &[("CENG", "CENG"), ("MATH", "MATH")],
        &[("MATH", exam_page(&[("MATH 157", "14.11.2025")]))],
    );
    let mut job = ExamJob::with_stamp(7);
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut job)
        .await
        .unwrap();

    assert_eq!(stats.partitions_failed, 1);
    assert_eq!(stats.partitions_done, 1);
    assert_eq!(stats.failures[0].partition, "CENG");
    assert_eq!(stats.failures[0].stage, PartitionState::Fetching);

    let rows = store.rows(tables::EXAMS);
    assert!(rows.iter().any(|r| r["id"] == "CENG-1-1"));
    assert!(rows.iter().any(|r| r["code"] == "MATH 157"));

    // Six attempts for CENG with strictly increasing timeouts, then MATH once.
    let log = log.lock().unwrap();
    let ceng: Vec<Duration> = log
        .submits
        .iter()
        .filter(|(value, _)| value == "CENG")
        .map(|(_, t)| *t)
        .collect();
    assert_eq!(ceng.len(), 6);
    assert!(ceng.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(log.submits.last().map(|(v, _)| v.as_str()), Some("MATH"));
    assert!(log.closed);
}

#[tokio::test]
async fn test_missing_table_fails_partition_without_delete() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::EXAMS, vec![json!({"id": "CENG-1-1", "code": "CENG 101"})]);
    let ctx = context(Arc::clone(&store));

    let (portal, _log) = ScriptedPortal::new(
        &[("CENG", "CENG")],
        &[("CENG", "<html><body>Servis dışı</body></html>".to_string())],
    );
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut ExamJob::with_stamp(1))
        .await
        .unwrap();

    assert_eq!(stats.partitions_failed, 1);
    assert_eq!(stats.failures[0].stage, PartitionState::Extracting);
    assert_eq!(store.rows(tables::EXAMS).len(), 1);
    assert!(!store.journal().iter().any(|c| c.starts_with("delete")));
}

#[tokio::test]
async fn test_delete_failure_counts_as_write_error() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::EXAMS, vec![json!({"id": "CENG-1-1", "code": "CENG 101"})]);
    store.fail_next(tables::EXAMS, StoreOp::Delete);
    let ctx = context(Arc::clone(&store));

    let (portal, _log) = ScriptedPortal::new(
        &[("CENG", "CENG")],
        &[("CENG", exam_page(&[("CENG 102", "12.11.2025")]))],
    );
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut ExamJob::with_stamp(1))
        .await
        .unwrap();

    assert_eq!(stats.write_errors, 1);
    assert_eq!(stats.failures[0].stage, PartitionState::Writing);
    let rows = store.rows(tables::EXAMS);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], "CENG 101");
}

#[tokio::test]
async fn test_unreachable_portal_is_fatal_and_closes() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(Arc::clone(&store));

    let (mut portal, log) = ScriptedPortal::new(&[], &[]);
    portal.unreachable = true;
    let err = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut ExamJob::with_stamp(1))
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(log.lock().unwrap().closed);
    assert!(store.journal().is_empty());
}

// ─────────────────────── schedule ───────────────────────

#[tokio::test]
async fn test_schedule_run_resolves_sessions() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMICS, vec![json!({"name": "Jane Doe"})]);
    let ctx = context(Arc::clone(&store));

    let page = grid_page(&["CENG 101 1<br>Dr. Jane Doe", "CENG 101 1<br>Dr. Jane Doe"]);
    let (portal, _log) = ScriptedPortal::new(
        &[("1", "A-101"), ("2", "BALGAT B-02"), ("3", "TEST")],
        &[("1", page)],
    );

    let mut job = ScheduleJob::new();
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut job)
        .await
        .unwrap();

    assert_eq!(stats.partitions_done, 1);
    assert_eq!(stats.partitions_skipped, 2);
    assert_eq!(stats.records_written, 2);

    assert_eq!(store.rows(tables::CLASSROOMS).len(), 1);
    assert_eq!(store.rows(tables::COURSES).len(), 1);

    // "Dr. Jane Doe" is new by exact name and created once.
    let academics = store.rows(tables::ACADEMICS);
    assert_eq!(academics.len(), 2);
    assert_eq!(job.counters().academics_created, 1);

    let sessions = store.rows(tables::COURSE_SESSIONS);
    assert_eq!(sessions[0]["section"], "1");
    assert_eq!(sessions[0]["time"], "09:10");
    assert_eq!(sessions[0]["day_of_week"], 1);
    assert_eq!(sessions[1]["day_of_week"], 2);
}

#[tokio::test]
async fn test_store_error_during_resolution_keeps_sessions() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMICS, vec![json!({"name": "Jane Doe"})]);
    store.seed(tables::CLASSROOMS, vec![json!({"room_name": "A-101"})]);
    let classroom_id = store.rows(tables::CLASSROOMS)[0]["id"].clone();
    store.seed(
        tables::COURSE_SESSIONS,
        vec![json!({"classroom_id": classroom_id, "section": "1", "time": "09:10"})],
    );
    store.fail_next(tables::ACADEMICS, StoreOp::Select);
    store.fail_next(tables::ACADEMICS, StoreOp::Select);
    let ctx = context(Arc::clone(&store));

    let page = grid_page(&["CENG 101 1<br>Jane Doe"]);
    let (portal, log) = ScriptedPortal::new(&[("1", "A-101")], &[("1", page)]);
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut ScheduleJob::new())
        .await
        .unwrap();

    assert_eq!(stats.partitions_done, 0);
    assert_eq!(stats.partitions_failed, 1);
    assert_eq!(stats.failures[0].stage, PartitionState::Resolving);
    assert_eq!(store.rows(tables::COURSE_SESSIONS).len(), 1);
    assert!(!store
        .journal()
        .iter()
        .any(|c| c == "delete course_sessions"));
    assert!(log.lock().unwrap().closed);
}

#[tokio::test]
async fn test_schedule_rerun_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMICS, vec![json!({"name": "Jane Doe"})]);
    let ctx = context(Arc::clone(&store));
    let page = grid_page(&["CENG 101 1<br>Jane Doe", "MATH 157 2<br>Jane Doe"]);

    for _ in 0..2 {
        let (portal, _log) = ScriptedPortal::new(&[("1", "A-101")], &[("1", page.clone())]);
        Orchestrator::new(&ctx, Duration::ZERO)
            .run(portal, &mut ScheduleJob::new())
            .await
            .unwrap();
    }

    assert_eq!(store.rows(tables::COURSE_SESSIONS).len(), 2);
    assert_eq!(store.rows(tables::CLASSROOMS).len(), 1);
    assert_eq!(store.rows(tables::COURSES).len(), 2);
    assert_eq!(store.rows(tables::ACADEMICS).len(), 1);
}

// ─────────────────────── calendar ───────────────────────

#[tokio::test]
async fn test_calendar_refresh_replaces_table() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMIC_CALENDAR, vec![json!({"id": "calendar-0001", "date": "old"})]);
    let ctx = context(Arc::clone(&store));

    let page = r#"<table>
        <tr><td colspan="2">LİSANS AKADEMİK TAKVİMİ</td></tr>
        <tr><td colspan="2">GÜZ YARIYILI</td></tr>
        <tr><td>15 Eylül 2025</td><td>Derslerin başlaması</td></tr>
        <tr><td>2 Ocak 2026</td><td>Derslerin sonu</td></tr>
    </table>"#;
    let (portal, _log) = ScriptedPortal::new(&[("cal", "academic-calendar")], &[("cal", page.to_string())]);

    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut CalendarJob::new(100))
        .await
        .unwrap();

    assert_eq!(stats.records_written, 2);
    let rows = store.rows(tables::ACADEMIC_CALENDAR);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "calendar-0001");
    assert_eq!(rows[0]["date"], "15 Eylül 2025");
    assert_eq!(rows[1]["school_type"], "LİSANS");
    assert_eq!(rows[1]["term"], "GÜZ YARIYILI");
}

#[tokio::test]
async fn test_calendar_without_rows_keeps_table() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMIC_CALENDAR, vec![json!({"id": "calendar-0001"})]);
    let ctx = context(Arc::clone(&store));

    let (portal, _log) = ScriptedPortal::new(
        &[("cal", "academic-calendar")],
        &[("cal", "<table><tr><td>bakım</td></tr></table>".to_string())],
    );
    let stats = Orchestrator::new(&ctx, Duration::ZERO)
        .run(portal, &mut CalendarJob::new(100))
        .await
        .unwrap();

    assert_eq!(stats.partitions_failed, 1);
    assert_eq!(store.rows(tables::ACADEMIC_CALENDAR).len(), 1);
}

// ─────────────────────── progress ───────────────────────

#[tokio::test]
async fn test_progress_events_follow_state_machine() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(Arc::clone(&store));
    let (tx, mut rx) = progress::channel();

    let (portal, _log) = ScriptedPortal::new(
        &[("CENG", "CENG")],
        &[("CENG", exam_page(&[("CENG 101", "12.11.2025")]))],
    );
    Orchestrator::new(&ctx, Duration::ZERO)
        .with_progress(tx)
        .run(portal, &mut ExamJob::with_stamp(1))
        .await
        .unwrap();

    let mut states = Vec::new();
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event.event {
            ProgressEventKind::StateChanged { state, .. } => states.push(state),
            ProgressEventKind::RunComplete { done, .. } => {
                completed = true;
                assert_eq!(done, 1);
            }
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec![
            PartitionState::Pending,
            PartitionState::Fetching,
            PartitionState::Extracting,
            PartitionState::Resolving,
            PartitionState::Writing,
            PartitionState::Done,
        ]
    );
    assert!(completed);
}

// ─────────────────────── pacing ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_delay_only_between_processed_partitions() {
    let store = Arc::new(MemoryStore::new());
    store.seed(tables::ACADEMICS, vec![json!({"name": "Jane Doe"})]);
    let ctx = context(Arc::clone(&store));
    let page = grid_page(&["CENG 101 1<br>Jane Doe"]);

    let (portal, _log) = ScriptedPortal::new(
        &[
            ("0", "BALGAT X-01"),
            ("1", "A-101"),
            ("2", "TEST"),
            ("3", "B-204"),
            ("4", "C-305"),
        ],
        &[("1", page.clone()), ("3", page.clone()), ("4", page)],
    );

    let started = tokio::time::Instant::now();
    let stats = Orchestrator::new(&ctx, Duration::from_millis(300))
        .run(portal, &mut ScheduleJob::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(stats.partitions_done, 3);
    assert_eq!(stats.partitions_skipped, 2);
    // Two pauses: none before the first processed partition, none for skips.
    assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "elapsed {elapsed:?}");
}
