use crate::attendance::is_constraint_violation;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_id, get_required_id, with_db};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn require_row(
    conn: &Connection,
    sql: &str,
    id: &str,
    message: &str,
) -> Result<(), HandlerErr> {
    let found: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    if found.is_none() {
        return Err(HandlerErr::new("not_found", message));
    }
    Ok(())
}

fn enrollments_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class not found")?;

    let mut stmt = conn.prepare(
        "SELECT e.id, s.id, s.name, s.email, e.marks
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ?
         ORDER BY s.name, s.id",
    )?;
    let enrollments = stmt
        .query_map([&class_id], |r| {
            let enrollment_id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let name: String = r.get(2)?;
            let email: Option<String> = r.get(3)?;
            let marks: Option<i64> = r.get(4)?;
            Ok(json!({
                "enrollmentId": enrollment_id,
                "studentId": student_id,
                "name": name,
                "email": email,
                "marks": marks
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "enrollments": enrollments }))
}

fn enrollments_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let student_id = get_required_id(params, "studentId")?;
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class not found")?;
    require_row(
        conn,
        "SELECT 1 FROM students WHERE id = ?",
        &student_id,
        "student not found",
    )?;

    let enrollment_id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO enrollments(id, student_id, class_id, created_at) VALUES(?, ?, ?, ?)",
        (&enrollment_id, &student_id, &class_id, Utc::now().to_rfc3339()),
    );
    match inserted {
        Ok(_) => Ok(json!({ "enrollmentId": enrollment_id })),
        Err(e) if is_constraint_violation(&e) => Err(HandlerErr::new(
            "already_enrolled",
            "student is already enrolled in this class",
        )),
        Err(e) => Err(HandlerErr::db("db_insert_failed", e, Some("enrollments"))),
    }
}

fn enrollments_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let student_id = get_required_id(params, "studentId")?;

    // Attendance rows stay; history only reports currently enrolled classes.
    let removed = conn
        .execute(
            "DELETE FROM enrollments WHERE class_id = ? AND student_id = ?",
            (&class_id, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e, Some("enrollments")))?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "enrollment not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Whole marks out of 100. Hosts send either a number or a numeric string.
fn parse_marks(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let out_of_range = || HandlerErr::bad_params("Marks must be between 0-100");
    let marks = match params.get("marks") {
        Some(serde_json::Value::Number(n)) => n.as_i64().ok_or_else(out_of_range)?,
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().map_err(|_| out_of_range())?,
        _ => return Err(out_of_range()),
    };
    if !(0..=100).contains(&marks) {
        return Err(out_of_range());
    }
    Ok(marks)
}

fn enrollments_set_marks(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let marks = parse_marks(params)?;

    let changed = match get_optional_id(params, "enrollmentId")? {
        Some(enrollment_id) => conn.execute(
            "UPDATE enrollments SET marks = ? WHERE id = ?",
            (marks, &enrollment_id),
        ),
        None => {
            let class_id = get_required_id(params, "classId")?;
            let student_id = get_required_id(params, "studentId")?;
            conn.execute(
                "UPDATE enrollments SET marks = ? WHERE class_id = ? AND student_id = ?",
                (marks, &class_id, &student_id),
            )
        }
    }
    .map_err(|e| HandlerErr::db("db_update_failed", e, Some("enrollments")))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "enrollment not found"));
    }
    tracing::info!(marks, "enrollment marks updated");

    Ok(json!({ "message": "Marks updated successfully", "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(with_db(state, req, enrollments_list)),
        "enrollments.create" => Some(with_db(state, req, enrollments_create)),
        "enrollments.delete" => Some(with_db(state, req, enrollments_delete)),
        "enrollments.setMarks" => Some(with_db(state, req, enrollments_set_marks)),
        _ => None,
    }
}
