use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub original_id: String,
    pub name: String,
    /// Distinct subject names taught, joined with `SUBJECT_SEPARATOR`.
    #[serde(default)]
    pub subject: String,
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

pub const SUBJECT_SEPARATOR: &str = " / ";

impl Teacher {
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subject
            .split(SUBJECT_SEPARATOR)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn teaches_subject(&self, subject: &str) -> bool {
        let wanted = subject.trim();
        self.subject == wanted || self.subjects().any(|s| s == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub day: String,
    pub name: String,
    #[serde(default)]
    pub short: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTiming {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub original_id: String,
    pub name: String,
    #[serde(default)]
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classroomids: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacherid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub original_id: String,
    pub name: String,
    #[serde(default)]
    pub short: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub original_id: String,
    pub name: String,
    #[serde(default)]
    pub short: String,
}

/// One raw `<TimeTableSchedule>` entry; ids are the cleaned XML values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub id: String,
    #[serde(rename = "dayID")]
    pub day_id: String,
    pub period: String,
    #[serde(rename = "lengthID", default, skip_serializing_if = "Option::is_none")]
    pub length_id: Option<String>,
    #[serde(rename = "schoolRoomID", default, skip_serializing_if = "Option::is_none")]
    pub school_room_id: Option<String>,
    #[serde(rename = "subjectGradeID", default, skip_serializing_if = "Option::is_none")]
    pub subject_grade_id: Option<String>,
    #[serde(rename = "classID", default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(rename = "optionalClassID", default, skip_serializing_if = "Option::is_none")]
    pub optional_class_id: Option<String>,
    #[serde(rename = "teacherID")]
    pub teacher_id: String,
}

/// A resolved teaching slot with display names instead of raw ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub day: String,
    pub period_number: i64,
    pub teacher_id: String,
    pub subject: String,
    #[serde(default)]
    pub class_name: String,
    /// `grade` attribute of the resolved class, when the export carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleData {
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub period_times: BTreeMap<i64, PeriodTiming>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub classrooms: Vec<Classroom>,
    #[serde(default)]
    pub schedules: Vec<ScheduleRow>,
    #[serde(default)]
    pub periods: Vec<Period>,
    pub school_id: String,
    pub upload_date: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_date: Option<String>,
}

impl ScheduleData {
    /// Finds a teacher by raw XML id, falling back to the namespaced suffix.
    pub fn teacher_by_raw_id(&self, raw_id: &str) -> Option<&Teacher> {
        let suffix = format!("-{}", raw_id);
        self.teachers
            .iter()
            .find(|t| t.original_id == raw_id || t.id.ends_with(&suffix))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Absence {
    pub id: String,
    pub teacher_id: String,
    pub date: String,
    pub periods: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute_teacher_id: Option<String>,
    pub school_id: String,
}

/// Teachers of every approved upload, in upload order.
pub fn approved_teachers(schedules: &[ScheduleData]) -> Vec<Teacher> {
    schedules
        .iter()
        .filter(|s| s.approved)
        .flat_map(|s| s.teachers.iter().cloned())
        .collect()
}

/// Resolved periods of every approved upload, in upload order.
pub fn approved_periods(schedules: &[ScheduleData]) -> Vec<Period> {
    schedules
        .iter()
        .filter(|s| s.approved)
        .flat_map(|s| s.periods.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_subject_matches_any_joined_name() {
        let t = Teacher {
            id: "s-1".into(),
            original_id: "1".into(),
            name: "A".into(),
            subject: "رياضيات / علوم".into(),
            school_id: "s".into(),
            short: None,
            gender: None,
            color: None,
        };
        assert!(t.teaches_subject("علوم"));
        assert!(t.teaches_subject("رياضيات / علوم"));
        assert!(!t.teaches_subject("لغة عربية"));
    }

    #[test]
    fn schedule_row_uses_xml_style_keys() {
        let row = ScheduleRow {
            id: "s-schedule-0".into(),
            day_id: "1".into(),
            period: "2".into(),
            length_id: None,
            school_room_id: None,
            subject_grade_id: Some("9".into()),
            class_id: None,
            optional_class_id: None,
            teacher_id: "5".into(),
        };
        let v = serde_json::to_value(&row).expect("serialize row");
        assert_eq!(v["dayID"], "1");
        assert_eq!(v["teacherID"], "5");
        assert_eq!(v["subjectGradeID"], "9");
        assert!(v.get("classID").is_none());
    }
}
