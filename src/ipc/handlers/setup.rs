use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::stats::LoadWindow;
use crate::substitutes::RankerSettings;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_DAYS: [&str; 5] = ["الأحد", "الاثنين", "الثلاثاء", "الأربعاء", "الخميس"];

#[derive(Clone, Copy)]
enum SetupSection {
    Substitutes,
    Timetable,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [Self::Substitutes, Self::Timetable];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "substitutes" => Some(Self::Substitutes),
            "timetable" => Some(Self::Timetable),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Substitutes => "substitutes",
            Self::Timetable => "timetable",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Substitutes => "setup.substitutes",
            Self::Timetable => "setup.timetable",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Substitutes => json!({
            "maxCandidates": 10,
            "highLoadPercent": 40,
            "lowLoadPercent": 20,
            "loadWindowDays": 30,
            "periodsPerDay": 8
        }),
        SetupSection::Timetable => json!({
            "periodsPerDay": 8,
            "days": DEFAULT_DAYS
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_day_names(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.is_empty() || items.len() > 7 {
        return Err(format!("{} must hold 1..=7 day names", key));
    }
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} entries must be non-empty strings", key))?;
        if out.iter().any(|d| d == name) {
            return Err(format!("{} contains {} twice", key, name));
        }
        out.push(name.to_string());
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Substitutes => match k.as_str() {
                "maxCandidates" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50)?));
                }
                "highLoadPercent" | "lowLoadPercent" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                "loadWindowDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 366)?));
                }
                "periodsPerDay" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 16)?));
                }
                _ => return Err(format!("unknown substitutes field: {}", k)),
            },
            SetupSection::Timetable => match k.as_str() {
                "periodsPerDay" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 16)?));
                }
                "days" => {
                    obj.insert(k.clone(), Value::from(parse_day_names(v, k)?));
                }
                _ => return Err(format!("unknown timetable field: {}", k)),
            },
        }
    }
    if let SetupSection::Substitutes = section {
        let low = obj.get("lowLoadPercent").and_then(|v| v.as_i64()).unwrap_or(20);
        let high = obj.get("highLoadPercent").and_then(|v| v.as_i64()).unwrap_or(40);
        if low > high {
            return Err("lowLoadPercent must not exceed highLoadPercent".into());
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::kv_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

fn int_field(section: &Value, key: &str, default: i64) -> i64 {
    section.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy)]
pub struct SubstituteSettings {
    pub ranker: RankerSettings,
    pub window: LoadWindow,
}

pub fn substitute_settings(conn: &Connection) -> Result<SubstituteSettings, HandlerErr> {
    let s = load_section(conn, SetupSection::Substitutes).map_err(HandlerErr::query)?;
    let defaults = RankerSettings::default();
    let window = LoadWindow::default();
    Ok(SubstituteSettings {
        ranker: RankerSettings {
            max_candidates: int_field(&s, "maxCandidates", defaults.max_candidates as i64)
                .max(1) as usize,
            high_load_percent: int_field(&s, "highLoadPercent", defaults.high_load_percent),
            low_load_percent: int_field(&s, "lowLoadPercent", defaults.low_load_percent),
        },
        window: LoadWindow {
            days: int_field(&s, "loadWindowDays", window.days),
            periods_per_day: int_field(&s, "periodsPerDay", window.periods_per_day),
        },
    })
}

#[derive(Debug, Clone)]
pub struct TimetableSettings {
    pub periods_per_day: i64,
    pub days: Vec<String>,
}

pub fn timetable_settings(conn: &Connection) -> Result<TimetableSettings, HandlerErr> {
    let s = load_section(conn, SetupSection::Timetable).map_err(HandlerErr::query)?;
    let days = s
        .get("days")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|d| d.as_str().map(|s| s.to_string()))
                .collect::<Vec<_>>()
        })
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DAYS.iter().map(|d| d.to_string()).collect());
    Ok(TimetableSettings {
        periods_per_day: int_field(&s, "periodsPerDay", 8),
        days,
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::kv_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.name(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn substitutes_patch_validates_ranges() {
        let mut current = default_section(SetupSection::Substitutes);
        merge_section_patch(
            SetupSection::Substitutes,
            &mut current,
            &patch(json!({ "maxCandidates": 5, "highLoadPercent": 60 })),
        )
        .expect("valid patch");
        assert_eq!(current["maxCandidates"], 5);
        assert_eq!(current["highLoadPercent"], 60);

        for bad in [
            json!({ "maxCandidates": 0 }),
            json!({ "highLoadPercent": "40" }),
            json!({ "lowLoadPercent": 90 }),
            json!({ "color": "red" }),
        ] {
            let mut c = default_section(SetupSection::Substitutes);
            assert!(merge_section_patch(SetupSection::Substitutes, &mut c, &patch(bad)).is_err());
        }
    }

    #[test]
    fn timetable_days_must_be_distinct_names() {
        let mut current = default_section(SetupSection::Timetable);
        merge_section_patch(
            SetupSection::Timetable,
            &mut current,
            &patch(json!({ "days": [" السبت ", "الأحد"] })),
        )
        .expect("valid days");
        assert_eq!(current["days"], json!(["السبت", "الأحد"]));

        let mut c = default_section(SetupSection::Timetable);
        assert!(merge_section_patch(
            SetupSection::Timetable,
            &mut c,
            &patch(json!({ "days": ["الأحد", "الأحد"] }))
        )
        .is_err());
        assert!(merge_section_patch(
            SetupSection::Timetable,
            &mut c,
            &patch(json!({ "days": [] }))
        )
        .is_err());
    }
}
