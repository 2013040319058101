use super::{
    AttendanceDate, AttendanceError, AttendanceRecord, AttendanceStatus, AttendanceStore,
    EnrollmentSource, NewAttendanceRecord, StatusUpdate,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};

/// In-memory store that mirrors the SQLite store's unique index and
/// per-batch atomicity, with switches for read failures.
#[derive(Default)]
pub(crate) struct MemoryStore {
    roster: RefCell<HashMap<String, BTreeSet<String>>>,
    rows: RefCell<Vec<AttendanceRecord>>,
    next_id: Cell<u64>,
    writes: Cell<usize>,
    fail_enrollment: Cell<bool>,
    fail_records: Cell<bool>,
    stale_student_day_read: Cell<bool>,
}

impl MemoryStore {
    pub(crate) fn with_roster(class_id: &str, students: &[&str]) -> Self {
        let store = MemoryStore::default();
        store.roster.borrow_mut().insert(
            class_id.to_string(),
            students.iter().map(|s| s.to_string()).collect(),
        );
        store
    }

    pub(crate) fn enroll(&self, class_id: &str, student_id: &str) {
        self.roster
            .borrow_mut()
            .entry(class_id.to_string())
            .or_default()
            .insert(student_id.to_string());
    }

    pub(crate) fn records(&self) -> Vec<AttendanceRecord> {
        self.rows.borrow().clone()
    }

    pub(crate) fn status_of(
        &self,
        student_id: &str,
        class_id: &str,
        date: &str,
    ) -> Option<AttendanceStatus> {
        self.rows
            .borrow()
            .iter()
            .find(|r| r.student_id == student_id && r.class_id == class_id && r.date.to_string() == date)
            .map(|r| r.status)
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.writes.get()
    }

    pub(crate) fn fail_enrollment_reads(&self, on: bool) {
        self.fail_enrollment.set(on);
    }

    pub(crate) fn fail_record_reads(&self, on: bool) {
        self.fail_records.set(on);
    }

    /// The next per-student lookup sees no rows, as if another writer
    /// committed between the check and the insert.
    pub(crate) fn stale_next_student_day_read(&self) {
        self.stale_student_day_read.set(true);
    }

    fn same_key(a: &AttendanceRecord, b: &NewAttendanceRecord) -> bool {
        a.student_id == b.student_id && a.class_id == b.class_id && a.date == b.date
    }
}

fn unique_violation() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
        Some("UNIQUE constraint failed: attendance.student_id, attendance.class_id, attendance.date".into()),
    )
}

impl EnrollmentSource for MemoryStore {
    fn enrolled_students(&self, class_id: &str) -> Result<BTreeSet<String>, AttendanceError> {
        if self.fail_enrollment.get() {
            return Err(rusqlite::Error::InvalidQuery.into());
        }
        Ok(self.roster.borrow().get(class_id).cloned().unwrap_or_default())
    }

    fn is_enrolled(&self, student_id: &str, class_id: &str) -> Result<bool, AttendanceError> {
        Ok(self.enrolled_students(class_id)?.contains(student_id))
    }
}

impl AttendanceStore for MemoryStore {
    fn records_for_day(
        &self,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        if self.fail_records.get() {
            return Err(rusqlite::Error::InvalidQuery.into());
        }
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|r| r.class_id == class_id && r.date == date)
            .cloned()
            .collect())
    }

    fn records_for_student_day(
        &self,
        student_id: &str,
        class_id: &str,
        date: AttendanceDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        if self.stale_student_day_read.replace(false) {
            return Ok(Vec::new());
        }
        Ok(self
            .records_for_day(class_id, date)?
            .into_iter()
            .filter(|r| r.student_id == student_id)
            .collect())
    }

    fn insert_records(
        &self,
        records: &[NewAttendanceRecord],
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        self.writes.set(self.writes.get() + 1);
        let mut rows = self.rows.borrow_mut();
        let mut created: Vec<AttendanceRecord> = Vec::with_capacity(records.len());
        for rec in records {
            let clash = rows.iter().chain(created.iter()).any(|r| Self::same_key(r, rec));
            if clash {
                return Err(unique_violation().into());
            }
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            created.push(AttendanceRecord {
                id: format!("att-{}", id),
                student_id: rec.student_id.clone(),
                class_id: rec.class_id.clone(),
                date: rec.date,
                status: rec.status,
                marked_at: rec.marked_at,
            });
        }
        rows.extend(created.iter().cloned());
        Ok(created)
    }

    fn update_statuses(&self, updates: &[StatusUpdate]) -> Result<usize, AttendanceError> {
        self.writes.set(self.writes.get() + 1);
        let mut rows = self.rows.borrow_mut();
        let mut changed = 0;
        for u in updates {
            if let Some(row) = rows.iter_mut().find(|r| r.id == u.record_id) {
                row.status = u.status;
                row.marked_at = u.marked_at;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
