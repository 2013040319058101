use crate::attendance::AttendanceError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error carried out of a handler body and turned into an `err` envelope.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::new("bad_params", message)
    }

    pub fn db(code: &'static str, e: impl ToString, table: Option<&str>) -> Self {
        HandlerErr {
            code,
            message: e.to_string(),
            details: table.map(|t| json!({ "table": t })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::db("db_query_failed", e, None)
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        match e {
            AttendanceError::InvalidInput(message) => HandlerErr::bad_params(message),
            AttendanceError::NotEnrolled { .. } => HandlerErr::new("not_enrolled", e.to_string()),
            AttendanceError::Duplicate {
                existing_status,
                record_count,
            } => {
                let message = e.to_string();
                HandlerErr {
                    code: "duplicate",
                    details: Some(json!({
                        "message": message,
                        "status": existing_status,
                        "recordCount": record_count,
                    })),
                    message,
                }
            }
            AttendanceError::Store(inner) => HandlerErr::from(inner),
        }
    }
}
