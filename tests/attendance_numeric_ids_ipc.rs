use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_acadenced");
    let mut child = Command::new(exe)
        .env_remove("ACADENCE_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn acadenced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    seq: usize,
}

impl Sidecar {
    fn start(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            child,
            stdin,
            reader,
            workspace,
            seq: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }));
        s
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        self.seq.to_string()
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    /// Creates a class owned by `teacher` with the given students enrolled.
    fn seed_class(&mut self, teacher: &str, names: &[&str]) -> (String, Vec<String>) {
        let class_id = self
            .ok("classes.create", json!({ "name": "Physics 11", "teacherId": teacher }))
            .get("classId")
            .and_then(|v| v.as_str())
            .expect("classId")
            .to_string();
        let mut students = Vec::new();
        for name in names {
            let sid = self
                .ok("students.create", json!({ "name": name }))
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string();
            self.ok(
                "enrollments.create",
                json!({ "classId": class_id, "studentId": sid }),
            );
            students.push(sid);
        }
        (class_id, students)
    }

    fn report(&mut self, teacher: &str, class_id: &str, date: &str) -> serde_json::Value {
        self.ok(
            "attendance.report",
            json!({ "classId": class_id, "date": date, "teacherId": teacher }),
        )
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}

fn status_for<'a>(report: &'a serde_json::Value, student_id: &str) -> Option<&'a str> {
    report
        .get("report")
        .and_then(|v| v.as_array())?
        .iter()
        .find(|r| r.get("student_id").and_then(|v| v.as_str()) == Some(student_id))
        .and_then(|r| r.get("status"))
        .and_then(|v| v.as_str())
}

/// Rows keyed the way an integer-keyed host database would key them.
fn seed_integer_keys(workspace: &std::path::Path) {
    let conn = rusqlite::Connection::open(workspace.join("acadence.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO classes(id, name, teacher_id) VALUES ('5', 'Biology', '12');
         INSERT INTO students(id, name, email) VALUES ('3', 'Ada', NULL), ('4', 'Grace', NULL);
         INSERT INTO enrollments(id, student_id, class_id) VALUES ('30', '3', '5'), ('40', '4', '5');",
    )
    .expect("seed integer keys");
}

#[test]
fn submit_accepts_integer_ids() {
    let mut sc = Sidecar::start("acadence-numeric-submit");
    seed_integer_keys(&sc.workspace);

    let res = sc.ok(
        "attendance.submit",
        json!({
            "teacherId": 12,
            "classId": 5,
            "date": "2024-03-01",
            "attendanceRecords": [{ "student_id": 3, "status": "late" }]
        }),
    );
    assert_eq!(res["submitted"], 2);
    assert_eq!(res["inserted"], 2);

    let rep = sc.ok(
        "attendance.report",
        json!({ "classId": 5, "date": "2024-03-01", "teacherId": 12 }),
    );
    assert_eq!(status_for(&rep, "3"), Some("late"));
    assert_eq!(status_for(&rep, "4"), Some("absent"));

    let denied = sc.call(
        "attendance.submit",
        json!({ "teacherId": 13, "classId": 5, "date": "2024-03-01" }),
    );
    assert_eq!(error_code(&denied), "forbidden");

    sc.finish();
}

#[test]
fn self_mark_and_history_accept_integer_ids() {
    let mut sc = Sidecar::start("acadence-numeric-self-mark");
    seed_integer_keys(&sc.workspace);

    let first = sc.ok(
        "attendance.markSelf",
        json!({ "studentId": 3, "classId": 5, "date": "2024-03-01" }),
    );
    assert_eq!(first["data"]["student_id"], "3");
    assert_eq!(first["data"]["class_id"], "5");

    let again = sc.call(
        "attendance.markSelf",
        json!({ "studentId": 3, "classId": 5, "date": "2024-03-01" }),
    );
    assert_eq!(error_code(&again), "duplicate");

    let hist = sc.ok("attendance.studentHistory", json!({ "studentId": 3 }));
    assert_eq!(hist["records"].as_array().map(|a| a.len()), Some(1));

    let fractional = sc.call(
        "attendance.markSelf",
        json!({ "studentId": 3.5, "classId": 5 }),
    );
    assert_eq!(error_code(&fractional), "bad_params");

    sc.finish();
}
