use crate::model::{
    Class, Classroom, Day, Period, PeriodTiming, ScheduleData, ScheduleRow, Subject, Teacher,
    SUBJECT_SEPARATOR,
};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use roxmltree::{Document, Node};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ScheduleData>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Messages collected while walking the document. Errors block the upload,
/// warnings are informational.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Reads an uploaded export from disk. Invalid UTF-8 sequences are kept as
/// U+FFFD so the name checks in `parse_timetable` can flag them.
pub fn read_timetable_file(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let bytes = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF][..])
        .unwrap_or(&bytes[..]);
    let text = String::from_utf8_lossy(bytes).into_owned();
    if text.trim().is_empty() {
        anyhow::bail!("file is empty or unreadable");
    }
    Ok(text)
}

pub fn parse_timetable(xml: &str, school_id: &str) -> ParseResult {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut diag = Diagnostics::default();
    match parse_into(xml, school_id, &mut diag) {
        Ok(data) => ParseResult {
            success: data.is_some() && diag.errors.is_empty(),
            data,
            errors: diag.errors,
            warnings: diag.warnings,
        },
        Err(e) => {
            diag.error(format!("failed to read timetable: {e}"));
            ParseResult {
                success: false,
                data: None,
                errors: diag.errors,
                warnings: diag.warnings,
            }
        }
    }
}

fn parse_into(
    xml: &str,
    school_id: &str,
    diag: &mut Diagnostics,
) -> anyhow::Result<Option<ScheduleData>> {
    if !xml.contains("<?xml") {
        diag.warn("missing XML declaration (<?xml ...?>)");
    }
    if !xml.to_ascii_lowercase().contains("utf-8") {
        diag.warn("no UTF-8 encoding declared; Arabic text may display incorrectly");
    }

    let (cleaned, stripped) = strip_asterisk_ids(xml)?;
    if stripped > 0 {
        diag.warn(format!(
            "stripped leading asterisks from {} identifiers (e.g. *123 -> 123)",
            stripped
        ));
    }

    let doc = match Document::parse(&cleaned) {
        Ok(doc) => doc,
        Err(e) => {
            diag.error(format!("invalid XML document: {}", e));
            return Ok(None);
        }
    };

    let days = extract_days(&doc, diag);
    let period_times = extract_period_times(&doc);
    let mut teachers = extract_teachers(&doc, school_id, diag);
    let classes = extract_classes(&doc, school_id, diag);
    let subjects = extract_subjects(&doc, school_id, diag);
    let classrooms = extract_classrooms(&doc, school_id, diag);
    let schedules = extract_schedule_rows(&doc, school_id, diag);

    let index = LookupIndex::build(&days, &subjects, &classes);
    let periods = resolve_periods(&schedules, &index, &period_times, school_id);
    fill_teacher_subjects(&mut teachers, &schedules, &index);

    if teachers.is_empty() {
        diag.error("no teachers found in the file");
    }
    if schedules.is_empty() {
        diag.warn("no schedule rows (TimeTableSchedule) found in the file");
    }
    if diag.errors.is_empty() {
        diag.warn(format!(
            "extracted {} teachers, {} classes and {} schedule rows",
            teachers.len(),
            classes.len(),
            schedules.len()
        ));
    }

    tracing::debug!(
        school_id,
        teachers = teachers.len(),
        classes = classes.len(),
        subjects = subjects.len(),
        rows = schedules.len(),
        errors = diag.errors.len(),
        warnings = diag.warnings.len(),
        "parsed timetable"
    );

    Ok(Some(ScheduleData {
        teachers,
        days,
        period_times,
        classes,
        subjects,
        classrooms,
        schedules,
        periods,
        school_id: school_id.to_string(),
        upload_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        approved: false,
        approved_date: None,
    }))
}

/// Rewrites every `="*123"` attribute value to `="123"` across the document.
fn strip_asterisk_ids(xml: &str) -> anyhow::Result<(Cow<'_, str>, usize)> {
    let re = Regex::new(r#"="\*+(\d+)""#)?;
    let count = re.find_iter(xml).count();
    if count == 0 {
        return Ok((Cow::Borrowed(xml), 0));
    }
    Ok((re.replace_all(xml, r#"="${1}""#), count))
}

const MOJIBAKE_LEADS: &[char] = &['Ã', 'Â', 'Ø', 'Ù', 'Ú', 'Û'];

pub fn is_garbled(name: &str) -> bool {
    name.chars().any(|c| {
        c == '\u{fffd}'
            || c == '?'
            || ('\u{80}'..='\u{9f}').contains(&c)
            || MOJIBAKE_LEADS.contains(&c)
    })
}

fn clean_id(raw: &str) -> String {
    raw.trim().trim_start_matches('*').to_string()
}

fn attr(node: Node, name: &str) -> String {
    node.attribute(name).unwrap_or("").trim().to_string()
}

fn optional_id(node: Node, name: &str) -> Option<String> {
    node.attribute(name)
        .map(clean_id)
        .filter(|s| !s.is_empty())
}

fn optional_attr(node: Node, name: &str) -> Option<String> {
    node.attribute(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn elements<'a, 'input: 'a>(
    doc: &'a Document<'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    doc.descendants()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn extract_days(doc: &Document, diag: &mut Diagnostics) -> Vec<Day> {
    let mut out = Vec::new();
    for node in elements(doc, "day") {
        let name = attr(node, "name");
        if is_garbled(&name) {
            diag.warn(format!("day name may be garbled: {}", name));
        }
        out.push(Day {
            day: clean_id(node.attribute("day").unwrap_or("")),
            name,
            short: attr(node, "short"),
        });
    }
    out
}

fn extract_period_times(doc: &Document) -> BTreeMap<i64, PeriodTiming> {
    let mut out = BTreeMap::new();
    for node in elements(doc, "period") {
        let Ok(number) = clean_id(node.attribute("period").unwrap_or("")).parse::<i64>() else {
            continue;
        };
        out.insert(
            number,
            PeriodTiming {
                start_time: attr(node, "starttime"),
                end_time: attr(node, "endtime"),
            },
        );
    }
    out
}

/// Common shape of `<teacher>`, `<class>`, `<subject>` and `<classroom>`:
/// entries without id or name are dropped.
fn named_entities<'a, 'input: 'a>(
    doc: &'a Document<'input>,
    tag: &'static str,
    diag: &mut Diagnostics,
) -> Vec<(String, String, Node<'a, 'input>)> {
    let mut out = Vec::new();
    for node in elements(doc, tag) {
        let id = clean_id(node.attribute("id").unwrap_or(""));
        let name = attr(node, "name");
        if id.is_empty() || name.is_empty() {
            diag.warn(format!("{} without id or name skipped", tag));
            continue;
        }
        out.push((id, name, node));
    }
    out
}

/// Garbled names of kept entries block the upload.
fn check_name_encoding(tag: &str, name: &str, diag: &mut Diagnostics) {
    if is_garbled(name) {
        diag.error(format!(
            "encoding problem in {} name: {} - save the file as UTF-8",
            tag, name
        ));
    }
}

/// Kept entries of `tag` with their names checked for encoding damage.
fn checked_entities<'a, 'input: 'a>(
    doc: &'a Document<'input>,
    tag: &'static str,
    diag: &mut Diagnostics,
) -> Vec<(String, String, Node<'a, 'input>)> {
    let entries = named_entities(doc, tag, diag);
    for (_, name, _) in &entries {
        check_name_encoding(tag, name, diag);
    }
    entries
}

fn extract_teachers(doc: &Document, school_id: &str, diag: &mut Diagnostics) -> Vec<Teacher> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut out = Vec::new();
    for (id, name, node) in named_entities(doc, "teacher", diag) {
        if !seen_ids.insert(id.clone()) {
            diag.warn(format!("duplicate teacher id {} ({}) skipped", id, name));
            continue;
        }
        check_name_encoding("teacher", &name, diag);
        if !seen_names.insert(name.clone()) {
            diag.warn(format!("duplicate teacher name: {}", name));
        }
        out.push(Teacher {
            id: format!("{}-{}", school_id, id),
            original_id: id,
            name,
            subject: String::new(),
            school_id: school_id.to_string(),
            short: optional_attr(node, "short"),
            gender: optional_attr(node, "gender"),
            color: optional_attr(node, "color"),
        });
    }
    out
}

fn extract_classes(doc: &Document, school_id: &str, diag: &mut Diagnostics) -> Vec<Class> {
    checked_entities(doc, "class", diag)
        .into_iter()
        .map(|(id, name, node)| Class {
            id: format!("{}-{}", school_id, id),
            original_id: id,
            name,
            short: attr(node, "short"),
            classroomids: optional_attr(node, "classroomids"),
            teacherid: optional_id(node, "teacherid"),
            grade: optional_attr(node, "grade"),
        })
        .collect()
}

fn extract_subjects(doc: &Document, school_id: &str, diag: &mut Diagnostics) -> Vec<Subject> {
    checked_entities(doc, "subject", diag)
        .into_iter()
        .map(|(id, name, node)| Subject {
            id: format!("{}-{}", school_id, id),
            original_id: id,
            name,
            short: attr(node, "short"),
        })
        .collect()
}

fn extract_classrooms(doc: &Document, school_id: &str, diag: &mut Diagnostics) -> Vec<Classroom> {
    checked_entities(doc, "classroom", diag)
        .into_iter()
        .map(|(id, name, node)| Classroom {
            id: format!("{}-{}", school_id, id),
            original_id: id,
            name,
            short: attr(node, "short"),
        })
        .collect()
}

fn extract_schedule_rows(
    doc: &Document,
    school_id: &str,
    diag: &mut Diagnostics,
) -> Vec<ScheduleRow> {
    let mut out = Vec::new();
    for (index, node) in elements(doc, "TimeTableSchedule").enumerate() {
        let day_id = optional_id(node, "DayID");
        let period = optional_id(node, "Period");
        let teacher_id = optional_id(node, "TeacherID");
        let (Some(day_id), Some(period), Some(teacher_id)) = (day_id, period, teacher_id) else {
            diag.warn(format!(
                "schedule row {} missing DayID, Period or TeacherID skipped",
                index + 1
            ));
            continue;
        };
        out.push(ScheduleRow {
            id: format!("{}-schedule-{}", school_id, index),
            day_id,
            period,
            length_id: optional_id(node, "LengthID"),
            school_room_id: optional_id(node, "SchoolRoomID"),
            subject_grade_id: optional_id(node, "SubjectGradeID"),
            class_id: optional_id(node, "ClassID"),
            optional_class_id: optional_id(node, "OptionalClassID"),
            teacher_id,
        });
    }
    out
}

/// Raw XML id -> resolved entity, built once per parse.
struct LookupIndex<'a> {
    days: HashMap<&'a str, &'a Day>,
    subjects: HashMap<&'a str, &'a Subject>,
    classes: HashMap<&'a str, &'a Class>,
}

impl<'a> LookupIndex<'a> {
    fn build(days: &'a [Day], subjects: &'a [Subject], classes: &'a [Class]) -> Self {
        let mut index = Self {
            days: HashMap::new(),
            subjects: HashMap::new(),
            classes: HashMap::new(),
        };
        for d in days {
            index.days.entry(d.day.as_str()).or_insert(d);
        }
        for s in subjects {
            index.subjects.entry(s.original_id.as_str()).or_insert(s);
        }
        for c in classes {
            index.classes.entry(c.original_id.as_str()).or_insert(c);
        }
        index
    }

    fn day_name(&self, raw_id: &str) -> String {
        self.days
            .get(raw_id)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    fn subject_name(&self, raw_id: Option<&str>) -> String {
        raw_id
            .and_then(|id| self.subjects.get(id))
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn class_name(&self, raw_id: Option<&str>) -> String {
        raw_id
            .and_then(|id| self.classes.get(id))
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn class_grade(&self, raw_id: Option<&str>) -> Option<String> {
        raw_id
            .and_then(|id| self.classes.get(id))
            .and_then(|c| c.grade.clone())
    }
}

fn resolve_periods(
    rows: &[ScheduleRow],
    index: &LookupIndex,
    period_times: &BTreeMap<i64, PeriodTiming>,
    school_id: &str,
) -> Vec<Period> {
    rows.iter()
        .map(|row| {
            let period_number = row.period.trim().parse::<i64>().unwrap_or(0);
            let timing = period_times.get(&period_number);
            Period {
                day: index.day_name(&row.day_id),
                period_number,
                teacher_id: format!("{}-{}", school_id, row.teacher_id),
                subject: index.subject_name(row.subject_grade_id.as_deref()),
                class_name: index.class_name(row.class_id.as_deref()),
                grade: index.class_grade(row.class_id.as_deref()),
                start_time: timing.map(|t| t.start_time.clone()),
                end_time: timing.map(|t| t.end_time.clone()),
            }
        })
        .collect()
}

fn fill_teacher_subjects(teachers: &mut [Teacher], rows: &[ScheduleRow], index: &LookupIndex) {
    let mut taught: HashMap<&str, Vec<&str>> = HashMap::new();
    for row in rows {
        let Some(subject_id) = row.subject_grade_id.as_deref() else {
            continue;
        };
        let ids = taught.entry(row.teacher_id.as_str()).or_default();
        if !ids.contains(&subject_id) {
            ids.push(subject_id);
        }
    }

    for teacher in teachers.iter_mut() {
        let Some(subject_ids) = taught.get(teacher.original_id.as_str()) else {
            continue;
        };
        let mut names: Vec<String> = Vec::new();
        for id in subject_ids {
            let name = index.subject_name(Some(id));
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        teacher.subject = names.join(SUBJECT_SEPARATOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asterisk_ids_are_rewritten_everywhere() {
        let (out, n) =
            strip_asterisk_ids(r#"<a id="*7"/><b TeacherID="**12" name="*x"/>"#).expect("strip");
        assert_eq!(n, 2);
        assert_eq!(out, r#"<a id="7"/><b TeacherID="12" name="*x"/>"#);
    }

    #[test]
    fn garbled_name_detection() {
        assert!(is_garbled("محمد\u{fffd}"));
        assert!(is_garbled("??? ????"));
        assert!(is_garbled("Ù…Ø­Ù…Ø¯"));
        assert!(!is_garbled("محمد البوصافي"));
        assert!(!is_garbled("John Smith"));
    }

    #[test]
    fn malformed_document_returns_no_data() {
        let r = parse_timetable("<?xml version=\"1.0\" encoding=\"UTF-8\"?><timetable><teacher", "s");
        assert!(!r.success);
        assert!(r.data.is_none());
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn period_timing_last_occurrence_wins() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<timetable>
  <periods>
    <period period="1" starttime="8:00" endtime="8:45"/>
    <period period="1" starttime="7:30" endtime="8:15"/>
  </periods>
  <teachers><teacher id="1" name="أحمد"/></teachers>
  <TimeTableSchedules><TimeTableSchedule DayID="1" Period="1" TeacherID="1"/></TimeTableSchedules>
</timetable>"#;
        let r = parse_timetable(xml, "s");
        let data = r.data.expect("data");
        assert_eq!(data.period_times.len(), 1);
        assert_eq!(data.period_times[&1].start_time, "7:30");
        assert_eq!(data.periods[0].start_time.as_deref(), Some("7:30"));
        assert_eq!(data.periods[0].day, "");
    }

    #[test]
    fn teacher_subjects_join_distinct_names() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<timetable>
  <teachers><teacher id="1" name="أحمد"/><teacher id="2" name="سالم"/></teachers>
  <subjects><subject id="1" name="رياضيات"/><subject id="2" name="علوم"/></subjects>
  <TimeTableSchedules>
    <TimeTableSchedule DayID="1" Period="1" SubjectGradeID="1" TeacherID="1"/>
    <TimeTableSchedule DayID="1" Period="2" SubjectGradeID="2" TeacherID="1"/>
    <TimeTableSchedule DayID="2" Period="1" SubjectGradeID="1" TeacherID="1"/>
    <TimeTableSchedule DayID="2" Period="3" SubjectGradeID="99" TeacherID="2"/>
  </TimeTableSchedules>
</timetable>"#;
        let data = parse_timetable(xml, "s").data.expect("data");
        assert_eq!(data.teachers[0].subject, "رياضيات / علوم");
        assert_eq!(data.teachers[1].subject, "");
    }
}
