use crate::absences;
use crate::model::{approved_periods, approved_teachers, Absence, Period, ScheduleData, Teacher};
use crate::substitutes::LoadTable;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Capacity used to turn substitution counts into a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadWindow {
    pub days: i64,
    pub periods_per_day: i64,
}

impl Default for LoadWindow {
    fn default() -> Self {
        Self {
            days: 30,
            periods_per_day: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstituteLoadRow {
    pub teacher_id: String,
    pub teacher_name: String,
    pub subject: String,
    pub substitute_count: i64,
    pub percentage: i64,
}

/// Periods each teacher has covered as a substitute. Empty when no absence
/// has been recorded yet.
pub fn substitute_load(
    absences: &[Absence],
    teachers: &[Teacher],
    window: LoadWindow,
) -> Vec<SubstituteLoadRow> {
    if absences.is_empty() {
        return Vec::new();
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for a in absences {
        if let Some(sub) = a.substitute_teacher_id.as_deref() {
            *counts.entry(sub).or_insert(0) += a.periods.len() as i64;
        }
    }

    let capacity = (window.days * window.periods_per_day).max(1) as f64;
    let mut rows: Vec<SubstituteLoadRow> = teachers
        .iter()
        .map(|t| {
            let count = counts.get(t.id.as_str()).copied().unwrap_or(0);
            let pct = ((count as f64 / capacity) * 100.0).round() as i64;
            SubstituteLoadRow {
                teacher_id: t.id.clone(),
                teacher_name: t.name.clone(),
                subject: t.subject.clone(),
                substitute_count: count,
                percentage: pct.min(100),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.substitute_count.cmp(&a.substitute_count));
    rows
}

pub fn load_table(rows: &[SubstituteLoadRow]) -> LoadTable {
    rows.iter()
        .map(|r| (r.teacher_id.clone(), r.percentage))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub day: String,
    pub periods: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDailyLoad {
    pub teacher_id: String,
    pub teacher_name: String,
    pub subject: String,
    pub days: Vec<DayCount>,
    pub total: usize,
}

pub fn daily_load(
    teachers: &[Teacher],
    periods: &[Period],
    days: &[String],
    subject: Option<&str>,
    teacher_id: Option<&str>,
) -> Vec<TeacherDailyLoad> {
    let mut per_teacher_day: HashMap<(&str, &str), usize> = HashMap::new();
    for p in periods {
        *per_teacher_day
            .entry((p.teacher_id.as_str(), p.day.as_str()))
            .or_insert(0) += 1;
    }

    teachers
        .iter()
        .filter(|t| subject.map(|s| t.teaches_subject(s)).unwrap_or(true))
        .filter(|t| teacher_id.map(|id| t.id == id).unwrap_or(true))
        .map(|t| {
            let days: Vec<DayCount> = days
                .iter()
                .map(|d| DayCount {
                    day: d.clone(),
                    periods: per_teacher_day
                        .get(&(t.id.as_str(), d.as_str()))
                        .copied()
                        .unwrap_or(0),
                })
                .collect();
            let total = days.iter().map(|d| d.periods).sum();
            TeacherDailyLoad {
                teacher_id: t.id.clone(),
                teacher_name: t.name.clone(),
                subject: t.subject.clone(),
                days,
                total,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTableRow {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub weekly_periods: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTable {
    pub rows: Vec<TeacherTableRow>,
    pub total_periods: usize,
}

/// Review table for one upload: weekly periods counted from raw schedule rows.
pub fn teacher_table(schedule: &ScheduleData) -> TeacherTable {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in &schedule.schedules {
        *counts.entry(row.teacher_id.as_str()).or_insert(0) += 1;
    }
    let mut rows: Vec<TeacherTableRow> = schedule
        .teachers
        .iter()
        .map(|t| TeacherTableRow {
            id: t.id.clone(),
            name: t.name.clone(),
            subject: if t.subject.is_empty() {
                "unspecified".to_string()
            } else {
                t.subject.clone()
            },
            weekly_periods: counts.get(t.original_id.as_str()).copied().unwrap_or(0),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    let total_periods = rows.iter().map(|r| r.weekly_periods).sum();
    TeacherTable {
        rows,
        total_periods,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableDay {
    pub day: String,
    /// Index `i` holds period `i + 1`.
    pub cells: Vec<Option<Period>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTimetable {
    pub teacher_id: String,
    pub teacher_name: Option<String>,
    pub grid: Vec<TimetableDay>,
    pub total_weekly_periods: usize,
}

/// Weekly grid for one teacher; callers pass the approved roster and periods.
pub fn teacher_timetable(
    teacher_id: &str,
    teachers: &[Teacher],
    periods: &[Period],
    days: &[String],
    periods_per_day: i64,
) -> TeacherTimetable {
    let teacher_periods: Vec<&Period> = periods
        .iter()
        .filter(|p| p.teacher_id == teacher_id)
        .collect();
    let teacher_name = absences::teacher_name(teachers, teacher_id).map(str::to_string);

    let grid = days
        .iter()
        .map(|day| TimetableDay {
            day: day.clone(),
            cells: (1..=periods_per_day)
                .map(|n| {
                    teacher_periods
                        .iter()
                        .find(|p| &p.day == day && p.period_number == n)
                        .map(|p| (*p).clone())
                })
                .collect(),
        })
        .collect();

    TeacherTimetable {
        teacher_id: teacher_id.to_string(),
        teacher_name,
        grid,
        total_weekly_periods: teacher_periods.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleViewRow {
    pub id: String,
    pub day: String,
    pub period: String,
    pub teacher: String,
    pub subject: String,
    pub class_name: String,
    pub classroom: String,
}

fn lookup_name<'a, T>(
    items: &'a [T],
    raw_id: &str,
    keys: impl Fn(&'a T) -> (&'a str, &'a str, &'a str),
) -> Option<&'a str> {
    let suffix = format!("-{}", raw_id);
    items.iter().map(keys).find_map(|(original_id, id, name)| {
        (original_id == raw_id || id.ends_with(&suffix)).then_some(name)
    })
}

fn label(found: Option<&str>, kind: &str, raw_id: Option<&str>) -> String {
    match (found, raw_id) {
        (Some(name), _) => name.to_string(),
        (None, Some(id)) => format!("{} {}", kind, id),
        (None, None) => String::new(),
    }
}

/// Raw schedule rows with ids replaced by names, or `<Kind> <id>` when the
/// id does not resolve.
pub fn schedule_view(schedule: &ScheduleData) -> Vec<ScheduleViewRow> {
    schedule
        .schedules
        .iter()
        .map(|row| {
            let day = schedule
                .days
                .iter()
                .find(|d| d.day == row.day_id)
                .map(|d| d.name.as_str());
            let teacher = schedule
                .teacher_by_raw_id(&row.teacher_id)
                .map(|t| t.name.as_str());
            let subject = row.subject_grade_id.as_deref().and_then(|id| {
                lookup_name(&schedule.subjects, id, |s| {
                    (s.original_id.as_str(), s.id.as_str(), s.name.as_str())
                })
            });
            let class_name = row.class_id.as_deref().and_then(|id| {
                lookup_name(&schedule.classes, id, |c| {
                    (c.original_id.as_str(), c.id.as_str(), c.name.as_str())
                })
            });
            let classroom = row.school_room_id.as_deref().and_then(|id| {
                lookup_name(&schedule.classrooms, id, |c| {
                    (c.original_id.as_str(), c.id.as_str(), c.name.as_str())
                })
            });
            ScheduleViewRow {
                id: row.id.clone(),
                day: label(day, "Day", Some(row.day_id.as_str())),
                period: row.period.clone(),
                teacher: label(teacher, "Teacher", Some(row.teacher_id.as_str())),
                subject: label(subject, "Subject", row.subject_grade_id.as_deref()),
                class_name: label(class_name, "Class", row.class_id.as_deref()),
                classroom: label(classroom, "Room", row.school_room_id.as_deref()),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_schedules: usize,
    pub approved_schedules: usize,
    pub unapproved_schedules: usize,
    pub total_teachers: usize,
    pub total_subjects: usize,
    pub total_periods: usize,
    pub total_absences: usize,
    pub absences_today: usize,
    /// Percentage of today's absences that have a substitute assigned.
    pub coverage_rate: i64,
    pub warnings: Vec<String>,
}

pub fn dashboard(schedules: &[ScheduleData], absences: &[Absence], date: &str) -> DashboardStats {
    let approved = schedules.iter().filter(|s| s.approved).count();
    let teachers = approved_teachers(schedules);
    let periods = approved_periods(schedules);
    let subjects: BTreeSet<&str> = teachers.iter().flat_map(|t| t.subjects()).collect();

    let today = absences::on_date(absences, date);
    let covered = today
        .iter()
        .filter(|a| a.substitute_teacher_id.is_some())
        .count();
    let coverage_rate = if today.is_empty() {
        100
    } else {
        ((covered as f64 / today.len() as f64) * 100.0).round() as i64
    };

    let mut warnings = Vec::new();
    if approved == 0 {
        warnings.push("no approved timetable yet".to_string());
    }
    let unknown = absences
        .iter()
        .filter(|a| absences::is_unknown(a, &teachers))
        .count();
    if unknown > 0 {
        warnings.push(format!(
            "{} absence records reference unknown teachers",
            unknown
        ));
    }
    if covered < today.len() {
        warnings.push(format!(
            "{} absences on {} have no substitute",
            today.len() - covered,
            date
        ));
    }

    DashboardStats {
        total_schedules: schedules.len(),
        approved_schedules: approved,
        unapproved_schedules: schedules.len() - approved,
        total_teachers: teachers.len(),
        total_subjects: subjects.len(),
        total_periods: periods.len(),
        total_absences: absences.len(),
        absences_today: today.len(),
        coverage_rate,
        warnings,
    }
}
