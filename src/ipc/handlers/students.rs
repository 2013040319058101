use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_id, get_optional_str, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if let Some(class_id) = get_optional_id(params, "classId")? {
        let roster = SqliteStore::new(conn).roster(&class_id)?;
        let students: Vec<serde_json::Value> = roster
            .into_iter()
            .map(|s| json!({ "id": s.id, "name": s.name, "email": s.email }))
            .collect();
        return Ok(json!({ "students": students }));
    }

    let mut stmt = conn.prepare("SELECT id, name, email FROM students ORDER BY name, id")?;
    let students = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let email: Option<String> = r.get(2)?;
            Ok(json!({ "id": id, "name": name, "email": email }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let email = get_optional_str(params, "email")?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, email) VALUES(?, ?, ?)",
        (&student_id, &name, &email),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e, Some("students")))?;

    Ok(json!({ "studentId": student_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        _ => None,
    }
}
