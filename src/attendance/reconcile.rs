use super::{
    require_id, AttendanceDate, AttendanceError, AttendanceStatus, AttendanceStore,
    EnrollmentSource, NewAttendanceRecord, StatusUpdate, Submission,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconciliationResult {
    pub submitted_count: usize,
    pub inserted_count: usize,
    pub updated_count: usize,
}

/// Applies a teacher's roll for `class_id` on `date`.
///
/// Every enrolled student ends with exactly one record: the last status
/// submitted for them, or absent when they were left out. Submissions for
/// students outside the roster are dropped. Both reads finish before the
/// first write, so a failed read never leaves partial writes behind.
pub fn reconcile<E, S>(
    enrollment: &E,
    store: &S,
    class_id: &str,
    date: AttendanceDate,
    submissions: &[Submission],
) -> Result<ReconciliationResult, AttendanceError>
where
    E: EnrollmentSource + ?Sized,
    S: AttendanceStore + ?Sized,
{
    let class_id = require_id(class_id, "classId")?;

    let enrolled = enrollment.enrolled_students(class_id)?;

    let mut roll: BTreeMap<&str, AttendanceStatus> = BTreeMap::new();
    let mut dropped = 0usize;
    for sub in submissions {
        if enrolled.contains(sub.student_id.as_str()) {
            roll.insert(sub.student_id.as_str(), sub.status);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(class_id, %date, dropped, "ignored submissions for students not enrolled");
    }
    for student_id in &enrolled {
        roll.entry(student_id.as_str())
            .or_insert(AttendanceStatus::Absent);
    }

    let existing = store.records_for_day(class_id, date)?;
    let mut existing_by_student = HashMap::with_capacity(existing.len());
    for rec in &existing {
        // The unique index keeps this to one row per student; if an older
        // store still holds extras, the first one wins and is the one updated.
        existing_by_student
            .entry(rec.student_id.as_str())
            .or_insert(rec);
    }

    let now = Utc::now();
    let mut to_insert = Vec::new();
    let mut to_update = Vec::new();
    for (student_id, status) in &roll {
        match existing_by_student.get(student_id) {
            None => to_insert.push(NewAttendanceRecord {
                student_id: (*student_id).to_string(),
                class_id: class_id.to_string(),
                date,
                status: *status,
                marked_at: now,
            }),
            Some(rec) if rec.status != *status => to_update.push(StatusUpdate {
                record_id: rec.id.clone(),
                status: *status,
                marked_at: now,
            }),
            Some(_) => {}
        }
    }

    if !to_insert.is_empty() {
        store.insert_records(&to_insert)?;
    }
    if !to_update.is_empty() {
        store.update_statuses(&to_update)?;
    }

    Ok(ReconciliationResult {
        submitted_count: enrolled.len(),
        inserted_count: to_insert.len(),
        updated_count: to_update.len(),
    })
}
