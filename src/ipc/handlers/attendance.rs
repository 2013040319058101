use crate::attendance::{
    build_day_report, mark_self_present, reconcile, summarize_by_class, AttendanceDate,
    AttendanceError, AttendanceStore, Submission,
};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_id, get_optional_str, get_required_id, get_required_str, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{ClassInfo, SqliteStore};
use rusqlite::Connection;
use serde_json::json;

fn parse_date(params: &serde_json::Value) -> Result<AttendanceDate, HandlerErr> {
    let raw = get_required_str(params, "date")?;
    Ok(AttendanceDate::parse(&raw)?)
}

fn parse_submissions(params: &serde_json::Value) -> Result<Vec<Submission>, HandlerErr> {
    match params.get("attendanceRecords") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(v @ serde_json::Value::Array(_)) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid attendanceRecords: {}", e))),
        Some(_) => Err(HandlerErr::bad_params("attendanceRecords must be an array")),
    }
}

/// The class must exist, and a class with an owner only answers to that teacher.
fn require_class_access(
    store: &SqliteStore<'_>,
    class_id: &str,
    teacher_id: Option<&str>,
) -> Result<ClassInfo, HandlerErr> {
    let Some(class) = store.class_info(class_id)? else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };
    if let Some(owner) = class.teacher_id.as_deref() {
        if teacher_id != Some(owner) {
            tracing::warn!(
                class_id,
                teacher_id = teacher_id.unwrap_or("-"),
                "rejected attendance access by non-owner"
            );
            return Err(HandlerErr::new(
                "forbidden",
                "you don't have permission to access attendance for this class",
            ));
        }
    }
    Ok(class)
}

fn attendance_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = parse_date(params)?;
    let teacher_id = get_optional_id(params, "teacherId")?;
    let submissions = parse_submissions(params)?;

    let store = SqliteStore::new(conn);
    require_class_access(&store, &class_id, teacher_id.as_deref())?;

    let result = reconcile(&store, &store, &class_id, date, &submissions).map_err(|e| {
        tracing::error!(class_id = %class_id, %date, error = %e, "attendance submit failed");
        e
    })?;
    tracing::info!(
        class_id = %class_id,
        %date,
        submitted = result.submitted_count,
        inserted = result.inserted_count,
        updated = result.updated_count,
        "attendance submitted"
    );

    Ok(json!({
        "message": "Attendance submitted successfully",
        "submitted": result.submitted_count,
        "inserted": result.inserted_count,
        "updated": result.updated_count
    }))
}

fn attendance_mark_self(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    let class_id = get_required_id(params, "classId")?;
    let date = match get_optional_str(params, "date")? {
        Some(raw) => AttendanceDate::parse(&raw)?,
        None => AttendanceDate::today(),
    };

    let store = SqliteStore::new(conn);
    match mark_self_present(&store, &store, &student_id, &class_id, date) {
        Ok(record) => {
            tracing::info!(student_id = %student_id, class_id = %class_id, %date, "self-mark recorded");
            Ok(json!({
                "message": "Attendance marked successfully",
                "data": record
            }))
        }
        Err(e @ AttendanceError::Duplicate { .. }) => {
            tracing::warn!(
                student_id = %student_id,
                class_id = %class_id,
                %date,
                "duplicate self-mark attempt"
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn attendance_report(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = parse_date(params)?;
    let teacher_id = get_optional_id(params, "teacherId")?;

    let store = SqliteStore::new(conn);
    let class = require_class_access(&store, &class_id, teacher_id.as_deref())?;
    let roster = store.roster(&class_id)?;
    let records = store.records_for_day(&class_id, date)?;

    let report = build_day_report(&class.name, date, &roster, &records);
    serde_json::to_value(report).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn attendance_student_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    let records = SqliteStore::new(conn).student_history(&student_id)?;
    let summary = summarize_by_class(&records);
    Ok(json!({ "records": records, "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.submit" => Some(with_db(state, req, attendance_submit)),
        "attendance.markSelf" => Some(with_db(state, req, attendance_mark_self)),
        "attendance.report" => Some(with_db(state, req, attendance_report)),
        "attendance.studentHistory" => Some(with_db(state, req, attendance_student_history)),
        _ => None,
    }
}
