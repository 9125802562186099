//! Relational store abstraction.
//!
//! The sync engine only needs five primitives: upsert by natural key,
//! batch insert, filtered delete, filtered select and (optionally) table
//! listing. [`PostgrestStore`] speaks them over a PostgREST endpoint;
//! [`MemoryStore`] keeps everything in process for tests and dry runs.

pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::{MemoryStore, StoreOp};
pub use postgrest::PostgrestStore;

/// Errors raised by a store backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{table}: request failed: {message}")]
    Transport { table: String, message: String },

    #[error("{table}: HTTP {status}: {message}")]
    Api {
        table: String,
        status: u16,
        message: String,
    },

    #[error("{table}: rejected: {message}")]
    Rejected { table: String, message: String },

    #[error("{table}: undecodable response: {message}")]
    Decode { table: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row.
    All,
    /// Column equals value.
    Eq(String, Value),
    /// Column differs from value.
    Neq(String, Value),
    /// Case-insensitive `LIKE`; `%` matches any run of characters.
    ILike(String, String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq(column.into(), value.into())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::ILike(column.into(), pattern.into())
    }

    /// Whether `row` satisfies the predicate.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(column, value) => row.get(column).is_some_and(|v| loose_eq(v, value)),
            Self::Neq(column, value) => !row.get(column).is_some_and(|v| loose_eq(v, value)),
            Self::ILike(column, pattern) => row
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|v| ilike_match(v, pattern)),
        }
    }

    /// PostgREST query parameter, or `None` for [`Filter::All`].
    pub fn to_query(&self) -> Option<(String, String)> {
        match self {
            Self::All => None,
            Self::Eq(column, value) => Some((column.clone(), format!("eq.{}", query_value(value)))),
            Self::Neq(column, value) => {
                Some((column.clone(), format!("neq.{}", query_value(value))))
            }
            Self::ILike(column, pattern) => Some((column.clone(), format!("ilike.{pattern}"))),
        }
    }
}

/// Sort order for selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }
}

/// Minimal relational store used by the sync engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `row`, or merge it into the row with the same `conflict_key`.
    /// Returns the stored row.
    async fn upsert(&self, table: &str, row: Value, conflict_key: &str) -> StoreResult<Vec<Value>>;

    /// Insert all rows in one call. Returns the stored rows.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> StoreResult<Vec<Value>>;

    /// Delete every row matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()>;

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> StoreResult<Vec<Value>>;

    /// Names of the exportable tables, if the backend can list them.
    async fn list_tables(&self) -> StoreResult<Option<Vec<String>>> {
        Ok(None)
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality that treats `7` and `"7"` as the same key.
fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || query_value(a) == query_value(b)
}

/// Case-insensitive SQL `LIKE` with `%` wildcards.
pub fn ilike_match(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    let [first, middle @ .., last] = parts.as_slice() else {
        return value == pattern;
    };
    if !value.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match value[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }

    value.len() >= pos + last.len() && value[pos..].ends_with(last)
}
