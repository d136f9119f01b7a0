use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{load_absences, load_schedules, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

/// What a workspace currently holds, reported on open and by `health`.
fn workspace_summary(conn: &Connection) -> Result<Value, HandlerErr> {
    let schedules = load_schedules(conn)?;
    let absences = load_absences(conn)?;
    Ok(json!({
        "schedules": schedules.len(),
        "approvedSchedules": schedules.iter().filter(|s| s.approved).count(),
        "absences": absences.len(),
        "approvedSchoolName": db::approved_school_name(conn).map_err(HandlerErr::query)?
    }))
}

fn handle_health(state: &mut AppState, req: &Request) -> Value {
    let summary = match state.db.as_ref().map(workspace_summary).transpose() {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "workspace": summary
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Value {
    let Some(path) = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    if path.is_file() {
        return err(
            &req.id,
            "bad_params",
            format!("workspace must be a directory: {}", path.display()),
            None,
        );
    }

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "io_failed", format!("{e:#}"), None),
    };
    let summary = match workspace_summary(&conn) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    tracing::info!(
        workspace = %path.display(),
        schedules = summary["schedules"].as_u64().unwrap_or(0),
        absences = summary["absences"].as_u64().unwrap_or(0),
        "workspace opened"
    );
    // Replacing the connection closes the previous workspace.
    state.db = Some(conn);
    state.workspace = Some(path.clone());
    ok(
        &req.id,
        json!({ "workspacePath": path.to_string_lossy(), "workspace": summary }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
