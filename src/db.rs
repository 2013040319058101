use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "acadence.sqlite3";
const ATTENDANCE_UNIQUE_INDEX: &str = "ux_attendance_student_class_date";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    migrate(&conn)?;
    Ok(conn)
}

/// Creates missing tables and indexes and upgrades older layouts in place.
pub fn migrate(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_id TEXT
        )",
        [],
    )?;
    // Workspaces created before class ownership existed lack teacher_id.
    ensure_classes_teacher_id(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_teacher ON classes(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            created_at TEXT,
            marks INTEGER,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, class_id)
        )",
        [],
    )?;
    ensure_enrollments_marks(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            marked_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    ensure_attendance_unique_index(conn)?;

    Ok(())
}

fn ensure_classes_teacher_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "teacher_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE classes ADD COLUMN teacher_id TEXT", [])?;
    Ok(())
}

fn ensure_enrollments_marks(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "enrollments", "marks")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE enrollments ADD COLUMN marks INTEGER", [])?;
    Ok(())
}

/// Older workspaces stored full timestamps in `attendance.date` and had no
/// uniqueness guarantee, so a student could hold several rows for one class
/// on one day. Normalize to UTC calendar days, keep the newest row of each
/// `(student, class, day)` group, then install the unique index.
fn ensure_attendance_unique_index(conn: &Connection) -> anyhow::Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?",
            [ATTENDANCE_UNIQUE_INDEX],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(());
    }

    let tx = conn
        .unchecked_transaction()
        .context("failed to start attendance migration")?;
    let normalized = tx.execute(
        "UPDATE attendance
         SET date = COALESCE(date(date), substr(date, 1, 10))
         WHERE length(date) > 10",
        [],
    )?;
    let collapsed = tx.execute(
        "DELETE FROM attendance
         WHERE rowid NOT IN (
           SELECT rid FROM (
             SELECT rowid AS rid,
                    ROW_NUMBER() OVER (
                      PARTITION BY student_id, class_id, date
                      ORDER BY marked_at DESC, rowid DESC
                    ) AS rn
             FROM attendance
           )
           WHERE rn = 1
         )",
        [],
    )?;
    tx.execute(
        &format!(
            "CREATE UNIQUE INDEX {} ON attendance(student_id, class_id, date)",
            ATTENDANCE_UNIQUE_INDEX
        ),
        [],
    )?;
    tx.commit().context("failed to commit attendance migration")?;

    if normalized > 0 || collapsed > 0 {
        tracing::info!(
            normalized,
            collapsed,
            "migrated attendance rows to one record per student/class/day"
        );
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
