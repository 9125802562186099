//! Portal abstraction for the university's web UI.
//!
//! A [`Portal`] owns one session against a portal root. `open` establishes
//! the session and lists the partitions the form exposes, `submit` performs
//! the request for one partition and returns the raw result markup, and
//! `close` releases the session. Portals are driven by the orchestrator one
//! partition at a time and never shared.

pub mod calendar;
pub mod exams;
pub mod schedule;

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::http::FetchFault;
use crate::types::{Partition, SyncError, SyncResult};

pub use calendar::CalendarPortal;
pub use exams::ExamPortal;
pub use schedule::SchedulePortal;

/// A stateful portal session.
#[async_trait]
pub trait Portal: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Establish the session and return the partitions in source order.
    ///
    /// An unreachable host is a [`SyncError::Connectivity`]. A page without
    /// the expected form yields an empty list.
    async fn open(&mut self) -> SyncResult<Vec<Partition>>;

    /// Request one partition's result markup within `timeout`.
    async fn submit(&mut self, partition: &Partition, timeout: Duration)
        -> Result<String, FetchFault>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);
}

/// Map a failed session-start request to the run-level error.
///
/// HTTP error pages come from a reachable host and are treated as an
/// unexpected page (`None`); transport faults are connectivity failures.
pub(crate) fn open_failure(url: &str, fault: FetchFault) -> Option<SyncError> {
    match fault {
        FetchFault::Status(status) => {
            tracing::warn!(url, status, "portal root answered with an error page");
            None
        }
        other => Some(SyncError::Connectivity {
            url: url.to_string(),
            reason: other.to_string(),
        }),
    }
}

/// Collect `(value, trimmed text)` for every `<option>` matched by `css`.
pub(crate) fn select_options(html: &str, css: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse(css) else {
        return Vec::new();
    };

    document
        .select(&sel)
        .map(|opt| {
            let text = opt.text().collect::<String>().trim().to_string();
            let value = opt
                .value()
                .attr("value")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| text.clone());
            (value, text)
        })
        .collect()
}
