//! Academic calendar page: a single partition fetched with a plain GET.

use std::time::Duration;

use async_trait::async_trait;

use super::Portal;
use crate::http::{FetchFault, HttpClient};
use crate::types::{Partition, SyncResult};

/// Label of the calendar's only partition.
pub const CALENDAR_PARTITION: &str = "academic-calendar";

pub struct CalendarPortal {
    http: HttpClient,
    url: String,
}

impl CalendarPortal {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Portal for CalendarPortal {
    fn name(&self) -> &str {
        "calendar"
    }

    async fn open(&mut self) -> SyncResult<Vec<Partition>> {
        Ok(vec![Partition::new(self.url.clone(), CALENDAR_PARTITION)])
    }

    async fn submit(
        &mut self,
        partition: &Partition,
        timeout: Duration,
    ) -> Result<String, FetchFault> {
        let resp = self.http.get(&partition.value, timeout).await?;
        Ok(resp.body)
    }

    async fn close(&mut self) {}
}
