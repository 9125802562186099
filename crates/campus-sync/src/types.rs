//! Core data types for portal partitions, extracted records and stored rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::FetchFault;
use crate::store::StoreError;

/// Store table names.
pub mod tables {
    pub const CLASSROOMS: &str = "classrooms";
    pub const ACADEMICS: &str = "academics";
    pub const COURSES: &str = "courses";
    pub const COURSE_SESSIONS: &str = "course_sessions";
    pub const EXAMS: &str = "exams";
    pub const ACADEMIC_CALENDAR: &str = "academic_calendar";
}

/// One selectable slice of a portal form (a classroom, a department).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Value submitted to the portal form.
    pub value: String,
    /// Human-readable option text.
    pub label: String,
}

impl Partition {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Store-assigned row identifier.
///
/// Kept as raw JSON so integer and UUID primary keys both round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub serde_json::Value);

impl RowId {
    /// Read the `id` column of a stored row.
    pub fn from_row(row: &serde_json::Value) -> Option<Self> {
        match row.get("id") {
            Some(serde_json::Value::Null) | None => None,
            Some(v) => Some(Self(v.clone())),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        Self(serde_json::Value::from(v))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Entity kinds that take part in name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Classroom,
    Academic,
    Course,
}

impl EntityKind {
    /// Table holding this kind.
    pub fn table(self) -> &'static str {
        match self {
            Self::Classroom => tables::CLASSROOMS,
            Self::Academic => tables::ACADEMICS,
            Self::Course => tables::COURSES,
        }
    }

    /// Natural-key column of this kind.
    pub fn key_column(self) -> &'static str {
        match self {
            Self::Classroom => "room_name",
            Self::Academic => "name",
            Self::Course => "course_code",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classroom => write!(f, "classroom"),
            Self::Academic => write!(f, "academic"),
            Self::Course => write!(f, "course"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Academic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub course_code: String,
}

/// A weekly course meeting, scoped to its classroom partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSession {
    pub course_id: RowId,
    pub classroom_id: RowId,
    pub instructor_id: RowId,
    pub section: String,
    pub day_of_week: u8,
    pub time: String,
}

/// An exam listing, scoped to its department partition by code prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub code: String,
    pub section: String,
    pub exam: String,
    pub date: String,
    pub starting: String,
    pub duration: String,
    pub hall: String,
}

/// One line of the academic calendar, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub school_type: String,
    pub term: String,
    pub date: String,
    pub description: String,
    pub sequence: u32,
}

/// Errors raised by the scrape-normalize-sync pipeline.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Portal unreachable at {url}: {reason}")]
    Connectivity { url: String, reason: String },

    #[error("Fetch exhausted for {partition} after {attempts} attempts: {last_fault}")]
    FetchExhausted {
        partition: String,
        attempts: u32,
        last_fault: FetchFault,
    },

    #[error("Parse anomaly in {context}: {reason}")]
    ParseAnomaly { context: String, reason: String },

    #[error("Unresolved {kind}: \"{key}\"")]
    ResolutionMiss { kind: EntityKind, key: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error must abort the whole run.
    ///
    /// Everything else is contained at partition or record scope.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Connectivity { .. })
    }
}

/// Convenience result type.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_id_from_row() {
        assert_eq!(RowId::from_row(&json!({"id": 7})), Some(RowId::from(7)));
        assert_eq!(
            RowId::from_row(&json!({"id": "a1b2"})).map(|id| id.to_string()),
            Some("a1b2".to_string())
        );
        assert_eq!(RowId::from_row(&json!({"id": null})), None);
        assert_eq!(RowId::from_row(&json!({"name": "x"})), None);
    }

    #[test]
    fn test_optional_id_not_serialized() {
        let course = Course {
            id: None,
            course_code: "CENG 101".into(),
        };
        assert_eq!(
            serde_json::to_value(&course).unwrap(),
            json!({"course_code": "CENG 101"})
        );
    }

    #[test]
    fn test_fatal_classes() {
        assert!(SyncError::Config("missing".into()).is_fatal());
        assert!(SyncError::Connectivity {
            url: "https://example.com".into(),
            reason: "refused".into()
        }
        .is_fatal());
        assert!(!SyncError::ParseAnomaly {
            context: "grid".into(),
            reason: "no table".into()
        }
        .is_fatal());
        assert!(!SyncError::ResolutionMiss {
            kind: EntityKind::Course,
            key: "CENG 101".into()
        }
        .is_fatal());
    }
}
