use crate::ipc::handlers::setup::timetable_settings;
use crate::ipc::helpers::{load_schedules, required_str, to_json, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{approved_periods, approved_teachers};
use crate::stats;
use rusqlite::Connection;
use serde_json::{json, Value};

fn teachers_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let schedules = load_schedules(conn)?;
    Ok(json!({ "teachers": to_json(&approved_teachers(&schedules))? }))
}

fn teachers_timetable(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let schedules = load_schedules(conn)?;
    let settings = timetable_settings(conn)?;
    let grid = stats::teacher_timetable(
        &teacher_id,
        &approved_teachers(&schedules),
        &approved_periods(&schedules),
        &settings.days,
        settings.periods_per_day,
    );
    if grid.teacher_name.is_none() && grid.total_weekly_periods == 0 {
        return Err(HandlerErr::not_found(format!("teacher not found: {}", teacher_id)));
    }
    to_json(&grid)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(with_conn(state, req, teachers_list)),
        "teachers.timetable" => Some(with_conn(state, req, teachers_timetable)),
        _ => None,
    }
}
