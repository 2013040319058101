//! Attendance records for a class on a calendar day.
//!
//! The invariant everything here protects: at most one record per
//! `(student_id, class_id, date)`. [`reconcile`] builds the final roll for a
//! teacher submission, [`mark_self_present`] is the add-only student path.

mod reconcile;
mod report;
mod self_mark;

#[cfg(test)]
pub(crate) mod testing;

pub use reconcile::reconcile;
pub use report::{build_day_report, summarize_by_class, RosterStudent};
pub use self_mark::mark_self_present;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar day. Time-of-day never takes part in attendance identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceDate(NaiveDate);

impl AttendanceDate {
    pub fn new(day: NaiveDate) -> Self {
        AttendanceDate(day)
    }

    pub fn today() -> Self {
        AttendanceDate(Utc::now().date_naive())
    }

    /// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp (its UTC day is used),
    /// or a zone-less `YYYY-MM-DDTHH:MM:SS[.fff]`.
    pub fn parse(raw: &str) -> Result<Self, AttendanceError> {
        let t = raw.trim();
        if t.is_empty() {
            return Err(AttendanceError::InvalidInput("date must not be empty".into()));
        }
        if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
            return Ok(AttendanceDate(d));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(t) {
            return Ok(AttendanceDate(ts.with_timezone(&Utc).date_naive()));
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(AttendanceDate(ts.date()));
        }
        Err(AttendanceError::InvalidInput(format!(
            "date must be YYYY-MM-DD or an RFC 3339 timestamp, got {:?}",
            t
        )))
    }
}

impl fmt::Display for AttendanceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for AttendanceDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

/// A record the store has not assigned an id to yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendanceRecord {
    pub student_id: String,
    pub class_id: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub record_id: String,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

/// One line of a teacher's roll. Field names follow the submit payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submission {
    #[serde(deserialize_with = "deserialize_id")]
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Int(i64),
}

/// Hosts backed by integer keys send ids as JSON numbers.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match WireId::deserialize(deserializer)? {
        WireId::Text(s) => s.trim().to_string(),
        WireId::Int(n) => n.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("student {student_id} is not enrolled in class {class_id}")]
    NotEnrolled { student_id: String, class_id: String },
    #[error("Attendance already marked for this date")]
    Duplicate {
        existing_status: AttendanceStatus,
        record_count: usize,
    },
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl AttendanceError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, AttendanceError::Store(e) if is_constraint_violation(e))
    }
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation)
}

pub trait EnrollmentSource {
    fn enrolled_students(&self, class_id: &str) -> Result<BTreeSet<String>, AttendanceError>;

    fn is_enrolled(&self, student_id: &str, class_id: &str) -> Result<bool, AttendanceError>;
}

pub trait AttendanceStore {
    fn records_for_day(
        &self,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError>;

    fn records_for_student_day(
        &self,
        student_id: &str,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError>;

    /// Persists every record and returns them with their assigned ids.
    fn insert_records(
        &self,
        records: &[NewAttendanceRecord],
    ) -> Result<Vec<AttendanceRecord>, AttendanceError>;

    /// Returns the number of rows changed.
    fn update_statuses(&self, updates: &[StatusUpdate]) -> Result<usize, AttendanceError>;
}

pub(crate) fn require_id<'a>(value: &'a str, field: &str) -> Result<&'a str, AttendanceError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(AttendanceError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(t)
}
