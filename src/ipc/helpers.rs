use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{Absence, ScheduleData};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query(e: anyhow::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: anyhow::Error) -> Self {
        tracing::warn!(error = %e, "store update failed");
        Self::new("db_update_failed", e.to_string())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Runs `f` against the open workspace, rendering the envelope either way.
pub fn with_conn(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; blank counts as absent.
pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key)))
}

pub fn i64_list(params: &Value, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain integers", key)))
        })
        .collect()
}

/// Missing or null yields an empty list.
pub fn string_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
            })
            .collect(),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an array", key))),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn load_schedules(conn: &Connection) -> Result<Vec<ScheduleData>, HandlerErr> {
    db::load_schedules(conn).map_err(HandlerErr::query)
}

pub fn save_schedules(conn: &Connection, schedules: &[ScheduleData]) -> Result<(), HandlerErr> {
    db::save_schedules(conn, schedules).map_err(HandlerErr::update)
}

pub fn load_absences(conn: &Connection) -> Result<Vec<Absence>, HandlerErr> {
    db::load_absences(conn).map_err(HandlerErr::query)
}

pub fn save_absences(conn: &Connection, absences: &[Absence]) -> Result<(), HandlerErr> {
    db::save_absences(conn, absences).map_err(HandlerErr::update)
}

pub fn find_schedule<'a>(
    schedules: &'a [ScheduleData],
    school_id: &str,
) -> Result<&'a ScheduleData, HandlerErr> {
    schedules
        .iter()
        .find(|s| s.school_id == school_id)
        .ok_or_else(|| HandlerErr::not_found(format!("no timetable with schoolId {}", school_id)))
}
