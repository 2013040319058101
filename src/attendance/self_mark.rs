use super::{
    require_id, AttendanceDate, AttendanceError, AttendanceRecord, AttendanceStatus,
    AttendanceStore, EnrollmentSource, NewAttendanceRecord,
};
use chrono::Utc;

/// Records a student as present after scanning the class QR code.
///
/// Add-only: an existing record for the day is reported as
/// [`AttendanceError::Duplicate`] and left untouched, so a student cannot
/// overwrite an absence a teacher already recorded.
pub fn mark_self_present<E, S>(
    enrollment: &E,
    store: &S,
    student_id: &str,
    class_id: &str,
    date: AttendanceDate,
) -> Result<AttendanceRecord, AttendanceError>
where
    E: EnrollmentSource + ?Sized,
    S: AttendanceStore + ?Sized,
{
    let student_id = require_id(student_id, "studentId")?;
    let class_id = require_id(class_id, "classId")?;

    if !enrollment.is_enrolled(student_id, class_id)? {
        return Err(AttendanceError::NotEnrolled {
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
        });
    }

    if let Some(dup) = duplicate_of(store, student_id, class_id, date)? {
        return Err(dup);
    }

    let record = NewAttendanceRecord {
        student_id: student_id.to_string(),
        class_id: class_id.to_string(),
        date,
        status: AttendanceStatus::Present,
        marked_at: Utc::now(),
    };
    match store.insert_records(std::slice::from_ref(&record)) {
        Ok(mut created) => created.pop().ok_or_else(|| {
            AttendanceError::Store(rusqlite::Error::QueryReturnedNoRows)
        }),
        // Lost the race to a concurrent mark; the unique index kept it to one row.
        Err(e) if e.is_unique_violation() => match duplicate_of(store, student_id, class_id, date)? {
            Some(dup) => Err(dup),
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

fn duplicate_of<S>(
    store: &S,
    student_id: &str,
    class_id: &str,
    date: AttendanceDate,
) -> Result<Option<AttendanceError>, AttendanceError>
where
    S: AttendanceStore + ?Sized,
{
    let existing = store.records_for_student_day(student_id, class_id, date)?;
    Ok(existing.first().map(|rec| AttendanceError::Duplicate {
        existing_status: rec.status,
        record_count: existing.len(),
    }))
}
