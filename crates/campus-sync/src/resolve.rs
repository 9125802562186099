//! Natural-key resolution of classrooms, courses and academics.
//!
//! Classrooms and courses are upserted on their natural key and their ids
//! cached for the run. Academics are created at most once per run: a
//! seen-set short-circuits repeats, and an exact-name lookup guards against
//! duplicates from earlier runs.
//!
//! Instructor names in the schedule grid carry titles the stored names may
//! lack (and vice versa), so instructor resolution is a containment match
//! against an index of all academics loaded once per run. The first match in
//! id order wins; two academics whose names contain one another can be
//! confused.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::store::{Filter, Order, Store};
use crate::sync::SyncWriter;
use crate::types::{EntityKind, RowId, SyncError, SyncResult};

/// Outcome of a lookup-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Upserted on its natural key.
    Upserted(RowId),
    /// Already stored under this exact key.
    Existing(RowId),
    /// Inserted by this call.
    Created(RowId),
    /// Already handled earlier in the run.
    Seen,
}

impl Resolution {
    pub fn id(&self) -> Option<&RowId> {
        match self {
            Self::Upserted(id) | Self::Existing(id) | Self::Created(id) => Some(id),
            Self::Seen => None,
        }
    }
}

/// Run-scoped name resolver.
#[derive(Debug, Default)]
pub struct EntityResolver {
    ids: HashMap<(EntityKind, String), RowId>,
    seen_academics: HashSet<String>,
    academic_index: Option<Vec<(RowId, String)>>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an entity with this natural key exists.
    pub async fn lookup_or_create(
        &mut self,
        store: &dyn Store,
        kind: EntityKind,
        key: &str,
    ) -> SyncResult<Resolution> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SyncError::ResolutionMiss {
                kind,
                key: key.to_string(),
            });
        }

        match kind {
            EntityKind::Academic => self.lookup_or_create_academic(store, key).await,
            EntityKind::Classroom | EntityKind::Course => {
                if self.ids.contains_key(&(kind, key.to_string())) {
                    return Ok(Resolution::Seen);
                }

                let row = json!({ kind.key_column(): key });
                let stored = SyncWriter::new(store)
                    .upsert(kind.table(), &row, kind.key_column())
                    .await?;
                let id = match stored.first().and_then(RowId::from_row) {
                    Some(id) => id,
                    None => self.exact_id(store, kind, key).await?,
                };

                debug!(%kind, key, %id, "upserted");
                self.ids.insert((kind, key.to_string()), id.clone());
                Ok(Resolution::Upserted(id))
            }
        }
    }

    async fn lookup_or_create_academic(
        &mut self,
        store: &dyn Store,
        name: &str,
    ) -> SyncResult<Resolution> {
        if self.seen_academics.contains(name) {
            return Ok(Resolution::Seen);
        }

        let kind = EntityKind::Academic;
        let existing = store
            .select(kind.table(), &Filter::eq(kind.key_column(), name), None)
            .await?;
        if let Some(id) = existing.first().and_then(RowId::from_row) {
            self.seen_academics.insert(name.to_string());
            return Ok(Resolution::Existing(id));
        }

        let stored = store
            .insert(kind.table(), vec![json!({ kind.key_column(): name })])
            .await?;
        let id = match stored.first().and_then(RowId::from_row) {
            Some(id) => id,
            None => self.exact_id(store, kind, name).await?,
        };

        info!(name, %id, "new academic");
        self.seen_academics.insert(name.to_string());
        if let Some(index) = self.academic_index.as_mut() {
            index.push((id.clone(), name.to_string()));
        }
        Ok(Resolution::Created(id))
    }

    /// Id of a course by exact code.
    pub async fn resolve_course(&mut self, store: &dyn Store, code: &str) -> SyncResult<RowId> {
        self.resolve_exact(store, EntityKind::Course, code).await
    }

    /// Id of a classroom by exact room name.
    pub async fn resolve_classroom(&mut self, store: &dyn Store, name: &str) -> SyncResult<RowId> {
        self.resolve_exact(store, EntityKind::Classroom, name).await
    }

    async fn resolve_exact(
        &mut self,
        store: &dyn Store,
        kind: EntityKind,
        key: &str,
    ) -> SyncResult<RowId> {
        let key = key.trim();
        if let Some(id) = self.ids.get(&(kind, key.to_string())) {
            return Ok(id.clone());
        }
        let id = self.exact_id(store, kind, key).await?;
        self.ids.insert((kind, key.to_string()), id.clone());
        Ok(id)
    }

    async fn exact_id(&self, store: &dyn Store, kind: EntityKind, key: &str) -> SyncResult<RowId> {
        let rows = store
            .select(kind.table(), &Filter::eq(kind.key_column(), key), None)
            .await?;
        rows.first()
            .and_then(RowId::from_row)
            .ok_or_else(|| SyncError::ResolutionMiss {
                kind,
                key: key.to_string(),
            })
    }

    /// Id of the academic whose stored name matches a scraped display name.
    ///
    /// A stored name containing the display name wins over a display name
    /// containing a stored name; within each pass the lowest id wins.
    pub async fn resolve_instructor(
        &mut self,
        store: &dyn Store,
        display_name: &str,
    ) -> SyncResult<RowId> {
        let needle = display_name.trim().to_lowercase();
        let miss = || SyncError::ResolutionMiss {
            kind: EntityKind::Academic,
            key: display_name.trim().to_string(),
        };
        if needle.is_empty() {
            return Err(miss());
        }

        let index = self.academic_index(store).await?;
        let lowered: Vec<(&RowId, String)> = index
            .iter()
            .map(|(id, name)| (id, name.trim().to_lowercase()))
            .collect();

        lowered
            .iter()
            .find(|(_, stored)| stored.contains(&needle))
            .or_else(|| {
                lowered
                    .iter()
                    .find(|(_, stored)| !stored.is_empty() && needle.contains(stored.as_str()))
            })
            .map(|(id, _)| (*id).clone())
            .ok_or_else(miss)
    }

    async fn academic_index(&mut self, store: &dyn Store) -> SyncResult<&[(RowId, String)]> {
        if self.academic_index.is_none() {
            let kind = EntityKind::Academic;
            let rows = store
                .select(kind.table(), &Filter::All, Some(&Order::asc("id")))
                .await?;
            let index: Vec<(RowId, String)> = rows
                .iter()
                .filter_map(|row| {
                    let id = RowId::from_row(row)?;
                    let name = row.get(kind.key_column()).and_then(Value::as_str)?;
                    Some((id, name.to_string()))
                })
                .collect();
            debug!(count = index.len(), "academic index loaded");
            self.academic_index = Some(index);
        }
        Ok(self.academic_index.as_deref().unwrap_or_default())
    }
}
