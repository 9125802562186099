//! PostgREST-backed store (the REST face of a Supabase project).
//!
//! Tables live under `{url}/rest/v1/<table>`. Every request carries the
//! project key both as `apikey` and as a bearer token. Writes ask for
//! `return=representation` so generated ids come back in the response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::{Filter, Order, Store, StoreError, StoreResult};
use crate::config::StoreCredentials;
use crate::types::{SyncError, SyncResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows requested per select page. Matches the server's default `max-rows`,
/// so a short page always means the end of the result.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Server-side function listing the public tables.
pub const LIST_TABLES_RPC: &str = "get_public_tables";

pub struct PostgrestStore {
    client: reqwest::Client,
    rest_url: String,
    key: String,
    page_size: usize,
}

impl PostgrestStore {
    pub fn new(credentials: &StoreCredentials) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build store client: {e}")))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", credentials.url.trim_end_matches('/')),
            key: credentials.key.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Page size for selects; must not exceed the server's `max-rows`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/{path}", self.rest_url))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(
        &self,
        table: &str,
        request: reqwest::RequestBuilder,
    ) -> StoreResult<reqwest::Response> {
        let resp = request.send().await.map_err(|e| StoreError::Transport {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        check_response(table, resp).await
    }

    async fn rows(&self, table: &str, resp: reqwest::Response) -> StoreResult<Vec<Value>> {
        resp.json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Decode {
                table: table.to_string(),
                message: e.to_string(),
            })
    }
}

/// Map a non-success status to [`StoreError::Api`] with the response body.
async fn check_response(table: &str, resp: reqwest::Response) -> StoreResult<reqwest::Response> {
    if !resp.status().is_success() {
        return Err(StoreError::Api {
            table: table.to_string(),
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}

/// Table names from the listing RPC: plain strings or `{table_name}` objects.
fn table_names(rows: &[Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| match row {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map
                .get("table_name")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Store for PostgrestStore {
    async fn upsert(&self, table: &str, row: Value, conflict_key: &str) -> StoreResult<Vec<Value>> {
        let request = self
            .request(Method::POST, table)
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);
        let resp = self.send(table, request).await?;
        self.rows(table, resp).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug!(table, count = rows.len(), "inserting rows");

        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&rows);
        let resp = self.send(table, request).await?;
        self.rows(table, resp).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()> {
        // PostgREST refuses unfiltered deletes.
        let (column, predicate) = filter
            .to_query()
            .unwrap_or_else(|| ("id".to_string(), "not.is.null".to_string()));

        let request = self
            .request(Method::DELETE, table)
            .query(&[(column.as_str(), predicate.as_str())])
            .header("Prefer", "return=minimal");
        self.send(table, request).await?;
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> StoreResult<Vec<Value>> {
        let mut query: Vec<(String, String)> = vec![("select".into(), "*".into())];
        if let Some(pair) = filter.to_query() {
            query.push(pair);
        }
        if let Some(order) = order {
            let direction = if order.ascending { "asc" } else { "desc" };
            query.push(("order".into(), format!("{}.{direction}", order.column)));
        }

        // The server caps every response, so read until a short page.
        let mut rows: Vec<Value> = Vec::new();
        let mut pages = 0usize;
        loop {
            let request = self
                .request(Method::GET, table)
                .query(&query)
                .query(&[("limit", self.page_size), ("offset", rows.len())]);
            let resp = self.send(table, request).await?;
            let page = self.rows(table, resp).await?;
            pages += 1;
            let last = page.len() < self.page_size;
            rows.extend(page);
            if last {
                break;
            }
        }
        if pages > 1 {
            debug!(table, pages, rows = rows.len(), "paged select");
        }
        Ok(rows)
    }

    async fn list_tables(&self) -> StoreResult<Option<Vec<String>>> {
        let path = format!("rpc/{LIST_TABLES_RPC}");
        let request = self
            .request(Method::POST, &path)
            .json(&serde_json::json!({}));
        let resp = self.send(LIST_TABLES_RPC, request).await?;
        let rows = self.rows(LIST_TABLES_RPC, resp).await?;
        Ok(Some(table_names(&rows)))
    }
}
