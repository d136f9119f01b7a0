use crate::absences::{self, NewAbsence};
use crate::ipc::helpers::{
    i64_list, load_absences, load_schedules, optional_str, required_str, save_absences, to_json,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{approved_periods, approved_teachers, Absence, Teacher};
use rusqlite::Connection;
use serde_json::{json, Value};

fn absence_json(a: &Absence, teachers: &[Teacher]) -> Result<Value, HandlerErr> {
    let mut v = to_json(a)?;
    v["teacherName"] = json!(absences::display_name(teachers, &a.teacher_id));
    v["substituteName"] = json!(a
        .substitute_teacher_id
        .as_deref()
        .map(|id| absences::display_name(teachers, id)));
    Ok(v)
}

fn absences_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_str(params, "date")?;
    let periods = i64_list(params, "periods")?;
    let substitute_teacher_id = optional_str(params, "substituteTeacherId");

    let teachers = approved_teachers(&load_schedules(conn)?);
    let Some(teacher) = teachers.iter().find(|t| t.id == teacher_id) else {
        return Err(HandlerErr::not_found("absent teacher is not in an approved timetable")
            .with_details(json!({ "teacherId": teacher_id })));
    };
    if let Some(sub) = substitute_teacher_id.as_deref() {
        if absences::teacher_name(&teachers, sub).is_none() {
            return Err(
                HandlerErr::not_found("substitute is not in an approved timetable")
                    .with_details(json!({ "substituteTeacherId": sub })),
            );
        }
    }
    let school_id = optional_str(params, "schoolId").unwrap_or_else(|| teacher.school_id.clone());

    let absence = absences::new_absence(NewAbsence {
        teacher_id,
        date,
        periods,
        substitute_teacher_id,
        school_id,
    })
    .map_err(HandlerErr::bad_params)?;

    let mut all = load_absences(conn)?;
    all.push(absence.clone());
    save_absences(conn, &all)?;
    tracing::info!(
        absence_id = %absence.id,
        teacher_id = %absence.teacher_id,
        date = %absence.date,
        periods = absence.periods.len(),
        "absence recorded"
    );
    absence_json(&absence, &teachers)
}

fn absences_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teachers = approved_teachers(&load_schedules(conn)?);
    let all = load_absences(conn)?;
    let date = optional_str(params, "date");
    let rows = all
        .iter()
        .filter(|a| date.as_deref().map(|d| a.date == d).unwrap_or(true))
        .map(|a| absence_json(a, &teachers))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "absences": rows }))
}

fn absences_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let absence_id = required_str(params, "absenceId")?;
    let mut all = load_absences(conn)?;
    let before = all.len();
    all.retain(|a| a.id != absence_id);
    if all.len() == before {
        return Err(HandlerErr::not_found(format!("absence not found: {}", absence_id)));
    }
    save_absences(conn, &all)?;
    Ok(json!({ "ok": true }))
}

fn absences_purge_unknown(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let teachers = approved_teachers(&load_schedules(conn)?);
    let (kept, removed) = absences::purge_unknown(load_absences(conn)?, &teachers);
    if removed > 0 {
        save_absences(conn, &kept)?;
        tracing::info!(removed, "purged absences with unknown teachers");
    }
    Ok(json!({ "removed": removed }))
}

fn absences_available_substitutes(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let day = required_str(params, "day")?;
    let periods = i64_list(params, "periods")?;
    let schedules = load_schedules(conn)?;
    let free = absences::available_substitutes(
        &approved_teachers(&schedules),
        &approved_periods(&schedules),
        &teacher_id,
        &day,
        &periods,
    );
    Ok(json!({ "teachers": to_json(&free)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "absences.record" => Some(with_conn(state, req, absences_record)),
        "absences.list" => Some(with_conn(state, req, absences_list)),
        "absences.delete" => Some(with_conn(state, req, absences_delete)),
        "absences.purgeUnknown" => Some(with_conn(state, req, absences_purge_unknown)),
        "absences.availableSubstitutes" => {
            Some(with_conn(state, req, absences_available_substitutes))
        }
        _ => None,
    }
}
