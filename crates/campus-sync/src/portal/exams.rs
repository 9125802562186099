//! Exam schedule portal.
//!
//! The listing page offers a department dropdown; the result table is a
//! form POST of `derskod=<department>` carrying the listing page's cookie
//! and matching `Referer`/`Origin` headers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{open_failure, select_options, Portal};
use crate::http::{FetchFault, HttpClient};
use crate::types::{Partition, SyncError, SyncResult};

/// Form field carrying the department code.
pub const DEPARTMENT_FIELD: &str = "derskod";

/// Department codes offered by the listing page.
///
/// The empty placeholder and the `0` "all" option are skipped.
pub fn parse_departments(html: &str) -> Vec<Partition> {
    select_options(html, &format!("select[name=\"{DEPARTMENT_FIELD}\"] option"))
        .into_iter()
        .filter(|(value, _)| !value.is_empty() && value != "0")
        .map(|(value, _)| Partition::new(value.clone(), value))
        .collect()
}

/// Session against the exam portal.
pub struct ExamPortal {
    http: HttpClient,
    list_url: String,
    table_url: String,
    origin: String,
    open_timeout: Duration,
    opened: bool,
}

impl ExamPortal {
    pub fn new(
        http: HttpClient,
        list_url: impl Into<String>,
        table_url: impl Into<String>,
        open_timeout: Duration,
    ) -> SyncResult<Self> {
        let list_url = list_url.into();
        let parsed = Url::parse(&list_url)
            .map_err(|e| SyncError::Config(format!("invalid exam list URL {list_url}: {e}")))?;

        Ok(Self {
            http,
            origin: parsed.origin().ascii_serialization(),
            list_url,
            table_url: table_url.into(),
            open_timeout,
            opened: false,
        })
    }
}

#[async_trait]
impl Portal for ExamPortal {
    fn name(&self) -> &str {
        "exams"
    }

    async fn open(&mut self) -> SyncResult<Vec<Partition>> {
        let page = match self.http.get(&self.list_url, self.open_timeout).await {
            Ok(page) => page,
            Err(fault) => {
                return match open_failure(&self.list_url, fault) {
                    Some(err) => Err(err),
                    None => Ok(Vec::new()),
                }
            }
        };

        if page.header("set-cookie").is_none() {
            debug!("exam listing set no cookie");
        }

        let departments = parse_departments(&page.body);
        if departments.is_empty() {
            warn!(url = %self.list_url, "department dropdown missing or empty");
        } else {
            info!(count = departments.len(), "departments listed");
        }

        self.opened = true;
        Ok(departments)
    }

    async fn submit(
        &mut self,
        partition: &Partition,
        timeout: Duration,
    ) -> Result<String, FetchFault> {
        if !self.opened {
            return Err(FetchFault::Other("exam session is not open".into()));
        }

        let fields = vec![(DEPARTMENT_FIELD.to_string(), partition.value.clone())];
        let headers = vec![
            ("Referer".to_string(), self.list_url.clone()),
            ("Origin".to_string(), self.origin.clone()),
        ];

        let resp = self
            .http
            .post_form(&self.table_url, &fields, &headers, timeout)
            .await?;
        Ok(resp.body)
    }

    async fn close(&mut self) {
        if self.opened {
            self.opened = false;
            debug!("exam session closed");
        }
    }
}
