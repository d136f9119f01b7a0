use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    find_schedule, load_schedules, optional_str, required_str, save_schedules, to_json, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ScheduleData;
use crate::stats;
use crate::timetable_xml::{self, ParseResult};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;

/// School id used for dry-run validation; never stored.
const VALIDATE_SCHOOL_ID: &str = "temp";

fn read_xml_param(params: &Value) -> Result<String, HandlerErr> {
    if let Some(xml) = params.get("xml").and_then(|v| v.as_str()) {
        return Ok(xml.to_string());
    }
    if let Some(path) = optional_str(params, "path") {
        return timetable_xml::read_timetable_file(Path::new(&path))
            .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")));
    }
    Err(HandlerErr::bad_params("missing xml or path"))
}

fn parse_report(result: &ParseResult, school_id: &str, stored: bool) -> Value {
    let (teachers, classes, rows) = result
        .data
        .as_ref()
        .map(|d| (d.teachers.len(), d.classes.len(), d.schedules.len()))
        .unwrap_or((0, 0, 0));
    json!({
        "success": result.success,
        "schoolId": school_id,
        "stored": stored,
        "errors": result.errors,
        "warnings": result.warnings,
        "teacherCount": teachers,
        "classCount": classes,
        "scheduleCount": rows
    })
}

fn schedules_import(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let xml = read_xml_param(params)?;
    let school_id = optional_str(params, "schoolId")
        .unwrap_or_else(|| format!("school-{}", Utc::now().timestamp_millis()));
    if school_id == VALIDATE_SCHOOL_ID {
        return Err(HandlerErr::bad_params("schoolId \"temp\" is reserved"));
    }

    let mut schedules = load_schedules(conn)?;
    if schedules.iter().any(|s| s.school_id == school_id) {
        return Err(HandlerErr::bad_params(format!(
            "schoolId already exists: {}",
            school_id
        )));
    }

    let result = timetable_xml::parse_timetable(&xml, &school_id);
    let stored = match (&result.data, result.success) {
        (Some(data), true) => {
            schedules.push(data.clone());
            save_schedules(conn, &schedules)?;
            tracing::info!(
                school_id = %school_id,
                teachers = data.teachers.len(),
                rows = data.schedules.len(),
                "timetable imported"
            );
            true
        }
        _ => {
            tracing::info!(
                school_id = %school_id,
                errors = result.errors.len(),
                "timetable rejected"
            );
            false
        }
    };
    Ok(parse_report(&result, &school_id, stored))
}

/// Dry run; works without a workspace.
fn handle_schedules_validate(req: &Request) -> Value {
    match read_xml_param(&req.params) {
        Ok(xml) => {
            let result = timetable_xml::parse_timetable(&xml, VALIDATE_SCHOOL_ID);
            ok(&req.id, parse_report(&result, VALIDATE_SCHOOL_ID, false))
        }
        Err(error) => error.response(&req.id),
    }
}

fn summary(s: &ScheduleData) -> Value {
    json!({
        "schoolId": s.school_id,
        "uploadDate": s.upload_date,
        "approved": s.approved,
        "approvedDate": s.approved_date,
        "teacherCount": s.teachers.len(),
        "classCount": s.classes.len(),
        "scheduleCount": s.schedules.len(),
        "periodCount": s.periods.len()
    })
}

fn schedules_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let schedules = load_schedules(conn)?;
    let school_name = db::approved_school_name(conn).map_err(HandlerErr::query)?;
    Ok(json!({
        "schedules": schedules.iter().map(summary).collect::<Vec<_>>(),
        "approvedSchoolName": school_name
    }))
}

fn schedules_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let schedules = load_schedules(conn)?;
    to_json(find_schedule(&schedules, &school_id)?)
}

fn schedules_approve(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let mut schedules = load_schedules(conn)?;
    let Some(schedule) = schedules.iter_mut().find(|s| s.school_id == school_id) else {
        return Err(HandlerErr::not_found(format!(
            "no timetable with schoolId {}",
            school_id
        )));
    };
    let approved_date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    schedule.approved = true;
    schedule.approved_date = Some(approved_date.clone());
    save_schedules(conn, &schedules)?;

    let school_name = optional_str(params, "schoolName");
    if let Some(name) = school_name.as_deref() {
        db::set_approved_school_name(conn, name).map_err(HandlerErr::update)?;
    }
    tracing::info!(school_id = %school_id, "timetable approved");
    Ok(json!({
        "schoolId": school_id,
        "approvedDate": approved_date,
        "schoolName": school_name
    }))
}

fn schedules_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let mut schedules = load_schedules(conn)?;
    let before = schedules.len();
    schedules.retain(|s| s.school_id != school_id);
    if schedules.len() == before {
        return Err(HandlerErr::not_found(format!(
            "no timetable with schoolId {}",
            school_id
        )));
    }
    save_schedules(conn, &schedules)?;
    tracing::info!(school_id = %school_id, "timetable deleted");
    Ok(json!({ "ok": true }))
}

fn schedules_teacher_table(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let schedules = load_schedules(conn)?;
    to_json(&stats::teacher_table(find_schedule(&schedules, &school_id)?))
}

fn schedules_view(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let schedules = load_schedules(conn)?;
    let schedule = match optional_str(params, "schoolId") {
        Some(id) => find_schedule(&schedules, &id)?,
        None => schedules
            .iter()
            .max_by(|a, b| a.upload_date.cmp(&b.upload_date))
            .ok_or_else(|| HandlerErr::not_found("no timetable uploaded yet"))?,
    };
    Ok(json!({
        "schoolId": schedule.school_id,
        "uploadDate": schedule.upload_date,
        "rows": to_json(&stats::schedule_view(schedule))?
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.import" => Some(with_conn(state, req, schedules_import)),
        "schedules.validate" => Some(handle_schedules_validate(req)),
        "schedules.list" => Some(with_conn(state, req, schedules_list)),
        "schedules.get" => Some(with_conn(state, req, schedules_get)),
        "schedules.approve" => Some(with_conn(state, req, schedules_approve)),
        "schedules.delete" => Some(with_conn(state, req, schedules_delete)),
        "schedules.teacherTable" => Some(with_conn(state, req, schedules_teacher_table)),
        "schedules.view" => Some(with_conn(state, req, schedules_view)),
        _ => None,
    }
}
