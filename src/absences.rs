use crate::model::{Absence, Period, Teacher};
use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

/// Display name used when an absence points at a teacher no approved
/// timetable knows about.
pub const UNKNOWN_TEACHER: &str = "unknown";

#[derive(Debug, Clone, Default)]
pub struct NewAbsence {
    pub teacher_id: String,
    pub date: String,
    pub periods: Vec<i64>,
    pub substitute_teacher_id: Option<String>,
    pub school_id: String,
}

pub fn new_absence(input: NewAbsence) -> Result<Absence, String> {
    let teacher_id = input.teacher_id.trim().to_string();
    if teacher_id.is_empty() {
        return Err("select the absent teacher".into());
    }
    let date = input.date.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("date must be YYYY-MM-DD, got {:?}", date))?;

    let mut periods = input.periods;
    periods.sort_unstable();
    periods.dedup();
    if periods.is_empty() {
        return Err("select at least one period".into());
    }
    if let Some(p) = periods.iter().find(|p| **p < 1) {
        return Err(format!("period numbers start at 1, got {}", p));
    }

    let substitute_teacher_id = input
        .substitute_teacher_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if substitute_teacher_id.as_deref() == Some(teacher_id.as_str()) {
        return Err("a teacher cannot substitute for their own absence".into());
    }

    Ok(Absence {
        id: format!("absence-{}", Uuid::new_v4()),
        teacher_id,
        date: date.to_string(),
        periods,
        substitute_teacher_id,
        school_id: input.school_id,
    })
}

pub fn teacher_name<'a>(teachers: &'a [Teacher], teacher_id: &str) -> Option<&'a str> {
    teachers
        .iter()
        .find(|t| t.id == teacher_id)
        .map(|t| t.name.as_str())
}

pub fn display_name(teachers: &[Teacher], teacher_id: &str) -> String {
    teacher_name(teachers, teacher_id)
        .unwrap_or(UNKNOWN_TEACHER)
        .to_string()
}

/// True when the absent teacher or the assigned substitute is not on the roster.
pub fn is_unknown(absence: &Absence, teachers: &[Teacher]) -> bool {
    teacher_name(teachers, &absence.teacher_id).is_none()
        || absence
            .substitute_teacher_id
            .as_deref()
            .map(|id| teacher_name(teachers, id).is_none())
            .unwrap_or(false)
}

/// Splits off absences that reference unknown teachers; returns the kept
/// records and the number removed.
pub fn purge_unknown(absences: Vec<Absence>, teachers: &[Teacher]) -> (Vec<Absence>, usize) {
    let before = absences.len();
    let kept: Vec<Absence> = absences
        .into_iter()
        .filter(|a| !is_unknown(a, teachers))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

pub fn on_date<'a>(absences: &'a [Absence], date: &str) -> Vec<&'a Absence> {
    absences.iter().filter(|a| a.date == date).collect()
}

/// Teachers with no class on `day` in any of `selected` periods, excluding the
/// absent teacher.
pub fn available_substitutes(
    teachers: &[Teacher],
    periods: &[Period],
    absent_teacher_id: &str,
    day: &str,
    selected: &[i64],
) -> Vec<Teacher> {
    if selected.is_empty() {
        return Vec::new();
    }
    let busy: HashSet<&str> = periods
        .iter()
        .filter(|p| p.day == day && selected.contains(&p.period_number))
        .map(|p| p.teacher_id.as_str())
        .collect();
    teachers
        .iter()
        .filter(|t| t.id != absent_teacher_id && !busy.contains(t.id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher(id: &str, name: &str) -> Teacher {
        Teacher {
            id: id.into(),
            original_id: id.into(),
            name: name.into(),
            subject: String::new(),
            school_id: "s".into(),
            short: None,
            gender: None,
            color: None,
        }
    }

    fn absence(teacher_id: &str, substitute: Option<&str>) -> Absence {
        Absence {
            id: format!("absence-{}", teacher_id),
            teacher_id: teacher_id.into(),
            date: "2026-10-18".into(),
            periods: vec![1],
            substitute_teacher_id: substitute.map(|s| s.to_string()),
            school_id: "s".into(),
        }
    }

    #[test]
    fn new_absence_normalizes_periods() {
        let a = new_absence(NewAbsence {
            teacher_id: "s-1".into(),
            date: "2026-10-18".into(),
            periods: vec![3, 1, 3],
            substitute_teacher_id: Some("  ".into()),
            school_id: "s".into(),
        })
        .expect("absence");
        assert_eq!(a.periods, vec![1, 3]);
        assert_eq!(a.substitute_teacher_id, None);
        assert!(a.id.starts_with("absence-"));
    }

    #[test]
    fn new_absence_rejects_bad_input() {
        let base = NewAbsence {
            teacher_id: "s-1".into(),
            date: "2026-10-18".into(),
            periods: vec![1],
            substitute_teacher_id: None,
            school_id: "s".into(),
        };
        assert!(new_absence(NewAbsence {
            teacher_id: String::new(),
            ..base.clone()
        })
        .is_err());
        assert!(new_absence(NewAbsence {
            periods: vec![],
            ..base.clone()
        })
        .is_err());
        assert!(new_absence(NewAbsence {
            date: "18/10/2026".into(),
            ..base.clone()
        })
        .is_err());
        assert!(new_absence(NewAbsence {
            substitute_teacher_id: Some("s-1".into()),
            ..base
        })
        .is_err());
    }

    #[test]
    fn purge_removes_unknown_teacher_or_substitute() {
        let roster = vec![teacher("s-1", "أحمد"), teacher("s-2", "سالم")];
        let absences = vec![
            absence("s-1", Some("s-2")),
            absence("s-9", None),
            absence("s-2", Some("s-9")),
            absence("s-2", None),
        ];
        let (kept, removed) = purge_unknown(absences, &roster);
        assert_eq!(removed, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(display_name(&roster, "s-9"), UNKNOWN_TEACHER);
    }

    #[test]
    fn available_substitutes_skip_busy_and_absent() {
        let roster = vec![teacher("a", "A"), teacher("b", "B"), teacher("c", "C")];
        let periods = vec![Period {
            day: "الأحد".into(),
            period_number: 2,
            teacher_id: "b".into(),
            subject: String::new(),
            class_name: String::new(),
            grade: None,
            start_time: None,
            end_time: None,
        }];
        let free = available_substitutes(&roster, &periods, "a", "الأحد", &[1, 2]);
        let ids: Vec<&str> = free.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert!(available_substitutes(&roster, &periods, "a", "الأحد", &[]).is_empty());
    }
}
