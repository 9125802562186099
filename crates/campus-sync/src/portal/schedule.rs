//! Classroom schedule portal (ASP.NET WebForms).
//!
//! The page keeps its state in hidden inputs (`__VIEWSTATE`,
//! `__EVENTVALIDATION`, ...). Choosing a classroom is a postback that echoes
//! those fields with `__EVENTTARGET` set to the dropdown. Each response
//! carries fresh state, which replaces the previous one.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::{open_failure, select_options, Portal};
use crate::http::{FetchFault, HttpClient};
use crate::types::{Partition, SyncResult};

/// Element id of the classroom dropdown.
pub const DROPDOWN_ID: &str = "DropDownList1";

/// Postback control fields that are always set explicitly.
const CONTROL_FIELDS: &[&str] = &["__EVENTTARGET", "__EVENTARGUMENT", "__LASTFOCUS"];

/// Hidden form state echoed on every postback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    fields: Vec<(String, String)>,
    select_name: Option<String>,
}

impl FormState {
    /// Capture the hidden inputs and the dropdown's form name from a page.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut state = Self::default();

        if let Ok(sel) = Selector::parse("input[type=hidden][name]") {
            for input in document.select(&sel) {
                let el = input.value();
                if let Some(name) = el.attr("name") {
                    if !CONTROL_FIELDS.contains(&name) {
                        let value = el.attr("value").unwrap_or("");
                        state.fields.push((name.to_string(), value.to_string()));
                    }
                }
            }
        }

        if let Ok(sel) = Selector::parse(&format!("select#{DROPDOWN_ID}")) {
            state.select_name = document
                .select(&sel)
                .next()
                .and_then(|s| s.value().attr("name"))
                .map(str::to_string);
        }

        state
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Form fields selecting `value` in the dropdown.
    pub fn postback_fields(&self, value: &str) -> Vec<(String, String)> {
        let select_name = self.select_name.as_deref().unwrap_or(DROPDOWN_ID);

        let mut fields = vec![
            ("__EVENTTARGET".to_string(), select_name.to_string()),
            ("__EVENTARGUMENT".to_string(), String::new()),
            ("__LASTFOCUS".to_string(), String::new()),
        ];
        fields.extend(self.fields.iter().cloned());
        fields.push((select_name.to_string(), value.to_string()));
        fields
    }
}

/// Classroom options, skipping empty values.
pub fn parse_classrooms(html: &str) -> Vec<Partition> {
    select_options(html, &format!("#{DROPDOWN_ID} option"))
        .into_iter()
        .filter(|(value, label)| !value.is_empty() && !label.is_empty())
        .map(|(value, label)| Partition::new(value, label))
        .collect()
}

/// Session against the schedule portal.
pub struct SchedulePortal {
    http: HttpClient,
    url: String,
    open_timeout: Duration,
    state: Option<FormState>,
}

impl SchedulePortal {
    pub fn new(http: HttpClient, url: impl Into<String>, open_timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            open_timeout,
            state: None,
        }
    }
}

#[async_trait]
impl Portal for SchedulePortal {
    fn name(&self) -> &str {
        "schedule"
    }

    async fn open(&mut self) -> SyncResult<Vec<Partition>> {
        let page = match self.http.get(&self.url, self.open_timeout).await {
            Ok(page) => page,
            Err(fault) => {
                return match open_failure(&self.url, fault) {
                    Some(err) => Err(err),
                    None => Ok(Vec::new()),
                }
            }
        };

        let state = FormState::from_html(&page.body);
        let classrooms = parse_classrooms(&page.body);

        if classrooms.is_empty() {
            warn!(url = %self.url, "classroom dropdown missing or empty");
        } else {
            info!(count = classrooms.len(), "classrooms listed");
        }

        self.state = Some(state);
        Ok(classrooms)
    }

    async fn submit(
        &mut self,
        partition: &Partition,
        timeout: Duration,
    ) -> Result<String, FetchFault> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| FetchFault::Other("schedule session is not open".into()))?;

        let fields = state.postback_fields(&partition.value);
        let headers = vec![("Referer".to_string(), self.url.clone())];
        let resp = self
            .http
            .post_form(&self.url, &fields, &headers, timeout)
            .await?;

        let next = FormState::from_html(&resp.body);
        if !next.is_empty() {
            self.state = Some(next);
        }
        Ok(resp.body)
    }

    async fn close(&mut self) {
        if self.state.take().is_some() {
            debug!("schedule session closed");
        }
    }
}
