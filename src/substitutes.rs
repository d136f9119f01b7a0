//! Substitute teacher ranking.
//!
//! Candidates are teachers who are free at the requested `(day, period)` slot.
//! Each candidate is scored by folding a fixed, ordered list of rules; every
//! rule that fires adds its points and a human-readable reason.
//!
//! Teaching at the exact slot is a hard exclusion, not a penalty.

use crate::model::{Period, Teacher};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// Teacher id -> share of the load window already spent substituting (0..=100).
pub type LoadTable = HashMap<String, i64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    All,
    Subject,
    Grade,
}

impl FilterMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "subject" => Some(Self::Subject),
            "grade" => Some(Self::Grade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlotQuery {
    pub day: String,
    pub period_number: i64,
    pub subject: Option<String>,
    pub grade: Option<String>,
    pub filter: FilterMode,
    /// Teachers the user has dismissed for this session.
    pub excluded_teacher_ids: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankerSettings {
    pub max_candidates: usize,
    pub high_load_percent: i64,
    pub low_load_percent: i64,
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            high_load_percent: 40,
            low_load_percent: 20,
        }
    }
}

/// What the rules know about one candidate.
#[derive(Debug, Clone)]
pub struct CandidateFacts<'a> {
    pub teacher: &'a Teacher,
    pub is_free: bool,
    pub has_adjacent_class: bool,
    pub same_subject: bool,
    pub same_grade: bool,
    pub grade: Option<&'a str>,
    pub load_percent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub points: i64,
    pub reason: String,
}

pub trait SubstituteRule: Debug {
    fn name(&self) -> &'static str;

    /// Returns `None` when the rule does not apply to this candidate.
    fn evaluate(&self, facts: &CandidateFacts, settings: &RankerSettings) -> Option<RuleOutcome>;
}

#[derive(Debug, Clone, Copy)]
pub struct Available;

impl SubstituteRule for Available {
    fn name(&self) -> &'static str {
        "available"
    }

    fn evaluate(&self, facts: &CandidateFacts, _settings: &RankerSettings) -> Option<RuleOutcome> {
        facts.is_free.then(|| RuleOutcome {
            points: 5,
            reason: "free in this period (+5)".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SameSubject;

impl SubstituteRule for SameSubject {
    fn name(&self) -> &'static str {
        "same_subject"
    }

    fn evaluate(&self, facts: &CandidateFacts, _settings: &RankerSettings) -> Option<RuleOutcome> {
        facts.same_subject.then(|| RuleOutcome {
            points: 3,
            reason: "teaches the same subject (+3)".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SameGrade;

impl SubstituteRule for SameGrade {
    fn name(&self) -> &'static str {
        "same_grade"
    }

    fn evaluate(&self, facts: &CandidateFacts, _settings: &RankerSettings) -> Option<RuleOutcome> {
        facts.same_grade.then(|| RuleOutcome {
            points: 2,
            reason: format!("already teaches grade {} (+2)", facts.grade.unwrap_or("")),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdjacentClass;

impl SubstituteRule for AdjacentClass {
    fn name(&self) -> &'static str {
        "adjacent_class"
    }

    fn evaluate(&self, facts: &CandidateFacts, _settings: &RankerSettings) -> Option<RuleOutcome> {
        facts.has_adjacent_class.then(|| RuleOutcome {
            points: -3,
            reason: "has a class right before or after (-3)".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HighSubstituteLoad;

impl SubstituteRule for HighSubstituteLoad {
    fn name(&self) -> &'static str {
        "high_substitute_load"
    }

    fn evaluate(&self, facts: &CandidateFacts, settings: &RankerSettings) -> Option<RuleOutcome> {
        let pct = facts.load_percent?;
        (pct > settings.high_load_percent).then(|| RuleOutcome {
            points: -2,
            reason: format!("high substitute load ({}%) (-2)", pct),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LowSubstituteLoad;

impl SubstituteRule for LowSubstituteLoad {
    fn name(&self) -> &'static str {
        "low_substitute_load"
    }

    fn evaluate(&self, facts: &CandidateFacts, settings: &RankerSettings) -> Option<RuleOutcome> {
        let pct = facts.load_percent?;
        (pct < settings.low_load_percent).then(|| RuleOutcome {
            points: 1,
            reason: format!("low substitute load ({}%) (+1)", pct),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstituteCandidate {
    pub teacher: Teacher,
    pub score: i64,
    pub reasons: Vec<String>,
    pub is_free: bool,
    pub has_adjacent_class: bool,
    pub same_subject: bool,
    pub same_grade: bool,
}

#[derive(Debug)]
pub struct SubstituteRanker {
    rules: Vec<Box<dyn SubstituteRule>>,
    settings: RankerSettings,
}

impl Default for SubstituteRanker {
    fn default() -> Self {
        Self::new(RankerSettings::default())
    }
}

impl SubstituteRanker {
    /// The standard rule chain, applied in this order.
    pub fn new(settings: RankerSettings) -> Self {
        Self::empty(settings)
            .with_rule(Available)
            .with_rule(SameSubject)
            .with_rule(SameGrade)
            .with_rule(AdjacentClass)
            .with_rule(HighSubstituteLoad)
            .with_rule(LowSubstituteLoad)
    }

    pub fn empty(settings: RankerSettings) -> Self {
        Self {
            rules: Vec::new(),
            settings,
        }
    }

    pub fn with_rule<R: SubstituteRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Total score and reasons for one candidate.
    pub fn score(&self, facts: &CandidateFacts) -> (i64, Vec<String>) {
        self.rules
            .iter()
            .filter_map(|r| r.evaluate(facts, &self.settings))
            .fold((0, Vec::new()), |(total, mut reasons), outcome| {
                reasons.push(outcome.reason);
                (total + outcome.points, reasons)
            })
    }

    pub fn rank(
        &self,
        query: &SlotQuery,
        teachers: &[Teacher],
        periods: &[Period],
        load: &LoadTable,
    ) -> Vec<SubstituteCandidate> {
        let mut busy: HashSet<&str> = HashSet::new();
        let mut adjacent: HashSet<&str> = HashSet::new();
        let mut classes_by_teacher: HashMap<&str, Vec<&Period>> = HashMap::new();
        for p in periods {
            classes_by_teacher
                .entry(p.teacher_id.as_str())
                .or_default()
                .push(p);
            if p.day != query.day {
                continue;
            }
            if p.period_number == query.period_number {
                busy.insert(p.teacher_id.as_str());
            } else if (p.period_number - query.period_number).abs() == 1 {
                adjacent.insert(p.teacher_id.as_str());
            }
        }

        let subject = non_empty(query.subject.as_deref());
        let grade = non_empty(query.grade.as_deref());
        let teaches_grade = |teacher: &Teacher, grade: &str| {
            classes_by_teacher
                .get(teacher.id.as_str())
                .map(|classes| classes.iter().any(|p| in_grade(p, grade)))
                .unwrap_or(false)
        };

        let mut out: Vec<SubstituteCandidate> = teachers
            .iter()
            .filter(|t| !query.excluded_teacher_ids.contains(&t.id))
            .filter(|t| !busy.contains(t.id.as_str()))
            .filter(|t| match (query.filter, subject, grade) {
                (FilterMode::Subject, Some(s), _) => t.teaches_subject(s),
                (FilterMode::Grade, _, Some(g)) => teaches_grade(*t, g),
                _ => true,
            })
            .map(|t| {
                let facts = CandidateFacts {
                    teacher: t,
                    is_free: true,
                    has_adjacent_class: adjacent.contains(t.id.as_str()),
                    same_subject: subject.map(|s| t.teaches_subject(s)).unwrap_or(false),
                    same_grade: grade.map(|g| teaches_grade(t, g)).unwrap_or(false),
                    grade,
                    load_percent: load.get(&t.id).copied(),
                };
                let (score, reasons) = self.score(&facts);
                SubstituteCandidate {
                    teacher: t.clone(),
                    score,
                    reasons,
                    is_free: facts.is_free,
                    has_adjacent_class: facts.has_adjacent_class,
                    same_subject: facts.same_subject,
                    same_grade: facts.same_grade,
                }
            })
            .collect();

        out.sort_by(|a, b| b.score.cmp(&a.score));
        out.truncate(self.settings.max_candidates);
        out
    }
}

/// Class grade attribute when present, otherwise the class-name token before
/// the section separator, such as `9` for `9/1`.
fn in_grade(period: &Period, grade: &str) -> bool {
    match period.grade.as_deref() {
        Some(g) => g.trim() == grade,
        None => period.class_name.trim().split(['/', ' ', '-']).next() == Some(grade),
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
