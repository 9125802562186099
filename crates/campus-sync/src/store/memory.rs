//! In-process store.
//!
//! Assigns integer ids, honours upsert conflict keys and keeps a journal of
//! every call so tests can assert on write ordering. Single failures can be
//! injected per table and operation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{Filter, Order, Store, StoreError, StoreResult};

/// Store primitive, as recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Upsert,
    Insert,
    Delete,
    Select,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert => write!(f, "upsert"),
            Self::Insert => write!(f, "insert"),
            Self::Delete => write!(f, "delete"),
            Self::Select => write!(f, "select"),
        }
    }
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<Value>>,
    next_id: i64,
    faults: Vec<(String, StoreOp)>,
    journal: Vec<String>,
}

impl State {
    fn assign_id(&mut self, row: &mut Value) {
        if let Value::Object(map) = row {
            if map.get("id").map_or(true, Value::is_null) {
                self.next_id += 1;
                map.insert("id".into(), Value::from(self.next_id));
            }
        }
    }

    /// Record the call and consume a matching injected fault.
    fn enter(&mut self, table: &str, op: StoreOp) -> StoreResult<()> {
        self.journal.push(format!("{op} {table}"));
        if let Some(pos) = self
            .faults
            .iter()
            .position(|(t, o)| t == table && *o == op)
        {
            self.faults.remove(pos);
            return Err(StoreError::Rejected {
                table: table.to_string(),
                message: format!("injected {op} failure"),
            });
        }
        Ok(())
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert rows directly, bypassing journal and faults.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = self.lock();
        for mut row in rows {
            state.assign_id(&mut row);
            state.tables.entry(table.to_string()).or_default().push(row);
        }
    }

    /// Current rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Fail the next `op` against `table`.
    pub fn fail_next(&self, table: &str, op: StoreOp) {
        self.lock().faults.push((table.to_string(), op));
    }

    /// Every call made so far, as `"<op> <table>"`.
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert(&self, table: &str, row: Value, conflict_key: &str) -> StoreResult<Vec<Value>> {
        let mut state = self.lock();
        state.enter(table, StoreOp::Upsert)?;

        let Value::Object(incoming) = row else {
            return Err(StoreError::Rejected {
                table: table.to_string(),
                message: "row must be a JSON object".into(),
            });
        };
        let key = incoming.get(conflict_key).cloned().ok_or_else(|| StoreError::Rejected {
            table: table.to_string(),
            message: format!("row lacks conflict column {conflict_key}"),
        })?;

        let existing = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get(conflict_key) == Some(&key)));

        if let Some(Value::Object(stored)) = existing {
            for (k, v) in incoming {
                if k != "id" {
                    stored.insert(k, v);
                }
            }
            return Ok(vec![Value::Object(stored.clone())]);
        }

        let mut row = Value::Object(incoming);
        state.assign_id(&mut row);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(vec![row])
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        let mut state = self.lock();
        state.enter(table, StoreOp::Insert)?;

        if rows.iter().any(|r| !r.is_object()) {
            return Err(StoreError::Rejected {
                table: table.to_string(),
                message: "rows must be JSON objects".into(),
            });
        }

        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            state.assign_id(&mut row);
            stored.push(row);
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()> {
        let mut state = self.lock();
        state.enter(table, StoreOp::Delete)?;

        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> StoreResult<Vec<Value>> {
        let mut state = self.lock();
        state.enter(table, StoreOp::Select)?;

        let mut rows: Vec<Value> = state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        Ok(rows)
    }

    async fn list_tables(&self) -> StoreResult<Option<Vec<String>>> {
        Ok(Some(self.lock().tables.keys().cloned().collect()))
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        _ => std::cmp::Ordering::Equal,
    }
}
