use crate::attendance::{
    AttendanceDate, AttendanceError, AttendanceRecord, AttendanceStatus, AttendanceStore,
    EnrollmentSource, NewAttendanceRecord, RosterStudent, StatusUpdate,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, student_id, class_id, date, status, marked_at";

impl ToSql for AttendanceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AttendanceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        AttendanceStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown attendance status {:?}", raw).into()))
    }
}

impl ToSql for AttendanceDate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for AttendanceDate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(AttendanceDate::new)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub fn format_marked_at(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let marked_at: String = r.get(5)?;
    let marked_at = DateTime::parse_from_rfc3339(&marked_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        date: r.get(3)?,
        status: r.get(4)?,
        marked_at,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub teacher_id: Option<String>,
}

/// Enrollment and attendance access over a workspace connection.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }

    pub fn class_info(&self, class_id: &str) -> rusqlite::Result<Option<ClassInfo>> {
        self.conn
            .query_row(
                "SELECT id, name, teacher_id FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok(ClassInfo {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        teacher_id: r.get(2)?,
                    })
                },
            )
            .optional()
    }

    pub fn roster(&self, class_id: &str) -> rusqlite::Result<Vec<RosterStudent>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.email
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.class_id = ?
             ORDER BY s.name, s.id",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(RosterStudent {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    email: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records for classes the student is currently enrolled in, newest day first.
    pub fn student_history(&self, student_id: &str) -> rusqlite::Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.student_id, a.class_id, a.date, a.status, a.marked_at
             FROM attendance a
             JOIN enrollments e ON e.class_id = a.class_id AND e.student_id = a.student_id
             WHERE a.student_id = ?
             ORDER BY a.date DESC, a.marked_at DESC",
        )?;
        let rows = stmt
            .query_map([student_id], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl EnrollmentSource for SqliteStore<'_> {
    fn enrolled_students(&self, class_id: &str) -> Result<BTreeSet<String>, AttendanceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id FROM enrollments WHERE class_id = ?")?;
        let ids = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn is_enrolled(&self, student_id: &str, class_id: &str) -> Result<bool, AttendanceError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM enrollments WHERE student_id = ? AND class_id = ?",
                (student_id, class_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl AttendanceStore for SqliteStore<'_> {
    fn records_for_day(
        &self,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE class_id = ? AND date = ? ORDER BY student_id",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map((class_id, date), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn records_for_student_day(
        &self,
        student_id: &str,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let sql = format!(
            "SELECT {} FROM attendance
             WHERE student_id = ? AND class_id = ? AND date = ?
             ORDER BY marked_at DESC",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map((student_id, class_id, date), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_records(
        &self,
        records: &[NewAttendanceRecord],
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut created = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance(id, student_id, class_id, date, status, marked_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
            )?;
            for rec in records {
                let id = Uuid::new_v4().to_string();
                stmt.execute((
                    &id,
                    &rec.student_id,
                    &rec.class_id,
                    rec.date,
                    rec.status,
                    format_marked_at(&rec.marked_at),
                ))?;
                created.push(AttendanceRecord {
                    id,
                    student_id: rec.student_id.clone(),
                    class_id: rec.class_id.clone(),
                    date: rec.date,
                    status: rec.status,
                    marked_at: rec.marked_at,
                });
            }
        }
        tx.commit()?;
        Ok(created)
    }

    fn update_statuses(&self, updates: &[StatusUpdate]) -> Result<usize, AttendanceError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE attendance SET status = ?, marked_at = ? WHERE id = ?")?;
            for u in updates {
                changed += stmt.execute((u.status, format_marked_at(&u.marked_at), &u.record_id))?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}
