#[path = "../src/absences.rs"]
mod absences;
#[path = "../src/model.rs"]
mod model;
#[path = "../src/stats.rs"]
mod stats;
#[path = "../src/substitutes.rs"]
mod substitutes;
#[path = "../src/timetable_xml.rs"]
mod timetable_xml;

mod test_support;

use model::{approved_periods, approved_teachers, Absence, ScheduleData};
use stats::{load_table, substitute_load, LoadWindow};
use substitutes::{FilterMode, LoadTable, SlotQuery, SubstituteRanker};
use test_support::read_fixture;

fn approved_sample() -> Vec<ScheduleData> {
    let mut data = timetable_xml::parse_timetable(&read_fixture("timetable/sample.xml"), "s")
        .data
        .expect("data");
    data.approved = true;
    vec![data]
}

fn slot(day: &str, period: i64) -> SlotQuery {
    SlotQuery {
        day: day.to_string(),
        period_number: period,
        ..SlotQuery::default()
    }
}

#[test]
fn busy_teacher_never_ranked_for_sample_slot() {
    let schedules = approved_sample();
    let teachers = approved_teachers(&schedules);
    let periods = approved_periods(&schedules);
    // Teacher 1 teaches Sunday period 1.
    let out = SubstituteRanker::default().rank(
        &slot("الأحد", 1),
        &teachers,
        &periods,
        &LoadTable::new(),
    );
    assert!(out.iter().all(|c| c.teacher.id != "s-1"));
    assert_eq!(out.len(), 2);
    assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn adjacent_period_lowers_score_by_three() {
    let schedules = approved_sample();
    let teachers = approved_teachers(&schedules);
    let periods = approved_periods(&schedules);
    // Sunday period 3: teacher 2 taught period 2, teacher 3 is idle all day.
    let out = SubstituteRanker::default().rank(
        &slot("الأحد", 3),
        &teachers,
        &periods,
        &LoadTable::new(),
    );
    let two = out.iter().find(|c| c.teacher.id == "s-2").expect("s-2");
    let three = out.iter().find(|c| c.teacher.id == "s-3").expect("s-3");
    assert!(two.has_adjacent_class);
    assert_eq!(three.score - two.score, 3);
}

#[test]
fn grade_filter_reads_class_grade_attribute() {
    let schedules = approved_sample();
    let teachers = approved_teachers(&schedules);
    let periods = approved_periods(&schedules);
    let mut q = slot("الخميس", 1);
    q.filter = FilterMode::Grade;
    q.grade = Some("9".into());
    let out = SubstituteRanker::default().rank(&q, &teachers, &periods, &LoadTable::new());
    let ids: Vec<&str> = out.iter().map(|c| c.teacher.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"s-1"));
    assert!(ids.contains(&"s-2"));
    assert!(out.iter().all(|c| c.same_grade && c.score == 7));
}

#[test]
fn heavy_substitutes_drop_in_the_ranking() {
    let schedules = approved_sample();
    let teachers = approved_teachers(&schedules);
    let periods = approved_periods(&schedules);
    let absences = vec![Absence {
        id: "absence-1".into(),
        teacher_id: "s-1".into(),
        date: "2026-10-18".into(),
        periods: vec![1, 2, 3, 4, 5],
        substitute_teacher_id: Some("s-3".into()),
        school_id: "s".into(),
    }];
    let window = LoadWindow {
        days: 1,
        periods_per_day: 8,
    };
    let rows = substitute_load(&absences, &teachers, window);
    assert_eq!(rows[0].teacher_id, "s-3");
    assert_eq!(rows[0].percentage, 63);
    assert!(rows.iter().all(|r| r.percentage <= 100));

    let out = SubstituteRanker::default().rank(
        &slot("الخميس", 1),
        &teachers,
        &periods,
        &load_table(&rows),
    );
    assert_eq!(out.last().map(|c| c.teacher.id.as_str()), Some("s-3"));
    assert_eq!(out.last().map(|c| c.score), Some(3));
    assert_eq!(out[0].score, 6);
}
