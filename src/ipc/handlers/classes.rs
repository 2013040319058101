use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_id, get_required_id, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn classes_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_optional_id(params, "teacherId")?;

    // Correlated subquery keeps the count independent of other joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.teacher_id,
           (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id) AS student_count
         FROM classes c
         WHERE ?1 IS NULL OR c.teacher_id = ?1
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map([teacher_id.as_deref()], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let teacher_id: Option<String> = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "teacherId": teacher_id,
                "studentCount": student_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({ "classes": classes }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "classes": [] }));
    }
    with_db(state, req, classes_list)
}

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let teacher_id = get_optional_id(params, "teacherId")?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, teacher_id) VALUES(?, ?, ?)",
        (&class_id, &name, &teacher_id),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, Some("classes")))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "class not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e, None))?;

    // No ON DELETE CASCADE; children go first.
    for (table, sql) in [
        ("attendance", "DELETE FROM attendance WHERE class_id = ?"),
        ("enrollments", "DELETE FROM enrollments WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return Err(HandlerErr::db("db_delete_failed", e, Some(table)));
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e, None))?;
    tracing::info!(class_id = %class_id, "class deleted");

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(with_db(state, req, classes_create)),
        "classes.delete" => Some(with_db(state, req, classes_delete)),
        _ => None,
    }
}
