use crate::db;
use crate::ipc::handlers::setup::{substitute_settings, timetable_settings};
use crate::ipc::helpers::{
    load_absences, load_schedules, optional_str, required_i64, required_str, string_list,
    to_json, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{approved_periods, approved_teachers};
use crate::stats;
use crate::substitutes::{FilterMode, SlotQuery, SubstituteRanker};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};

fn analytics_suggest_substitutes(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let day = required_str(params, "day")?;
    let period_number = required_i64(params, "periodNumber")?;
    let filter = match optional_str(params, "filterMode") {
        Some(raw) => FilterMode::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("filterMode must be one of: all, subject, grade")
        })?,
        None => FilterMode::All,
    };
    let query = SlotQuery {
        day,
        period_number,
        subject: optional_str(params, "subject"),
        grade: optional_str(params, "grade"),
        filter,
        excluded_teacher_ids: string_list(params, "excludedTeacherIds")?
            .into_iter()
            .collect(),
    };

    let settings = substitute_settings(conn)?;
    let schedules = load_schedules(conn)?;
    let teachers = approved_teachers(&schedules);
    let periods = approved_periods(&schedules);
    let load = stats::load_table(&stats::substitute_load(
        &load_absences(conn)?,
        &teachers,
        settings.window,
    ));

    let ranker = SubstituteRanker::new(settings.ranker);
    let candidates = ranker.rank(&query, &teachers, &periods, &load);
    tracing::debug!(
        rules = ?ranker.rule_names(),
        day = %query.day,
        period = query.period_number,
        candidates = candidates.len(),
        "ranked substitutes"
    );
    Ok(json!({ "candidates": to_json(&candidates)? }))
}

fn analytics_substitute_load(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let settings = substitute_settings(conn)?;
    let teachers = approved_teachers(&load_schedules(conn)?);
    let rows = stats::substitute_load(&load_absences(conn)?, &teachers, settings.window);
    Ok(json!({ "rows": to_json(&rows)? }))
}

fn analytics_daily_load(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let settings = timetable_settings(conn)?;
    let schedules = load_schedules(conn)?;
    let subject = optional_str(params, "subject");
    let teacher_id = optional_str(params, "teacherId");
    let rows = stats::daily_load(
        &approved_teachers(&schedules),
        &approved_periods(&schedules),
        &settings.days,
        subject.as_deref(),
        teacher_id.as_deref(),
    );
    Ok(json!({ "days": settings.days, "rows": to_json(&rows)? }))
}

fn analytics_dashboard(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = match optional_str(params, "date") {
        Some(d) => {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
            d
        }
        None => chrono::Local::now().format("%Y-%m-%d").to_string(),
    };
    let schedules = load_schedules(conn)?;
    let absences = load_absences(conn)?;
    let mut out = to_json(&stats::dashboard(&schedules, &absences, &date))?;
    out["date"] = json!(date);
    out["approvedSchoolName"] =
        json!(db::approved_school_name(conn).map_err(HandlerErr::query)?);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.suggestSubstitutes" => {
            Some(with_conn(state, req, analytics_suggest_substitutes))
        }
        "analytics.substituteLoad" => Some(with_conn(state, req, analytics_substitute_load)),
        "analytics.dailyLoad" => Some(with_conn(state, req, analytics_daily_load)),
        "analytics.dashboard" => Some(with_conn(state, req, analytics_dashboard)),
        _ => None,
    }
}
