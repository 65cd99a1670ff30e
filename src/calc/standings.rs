//! Leaderboard assembly: subject grades for a whole cohort, per-student GWA,
//! the overall ranking and one ranking per subject.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::aggregate::{calculate_weighted_average, compute_subject_grade, UnitGrade};
use super::gpa::{GpaMode, GpaScale};
use super::ranking::{RankingEngine, RankingMode, Scored, SortDirection, ViewerStanding};
use super::{GradeComponent, ScoreEntry, StudentId, SubjectId};

#[derive(Debug, Clone, PartialEq)]
pub struct StudentProfile {
    pub student_id: StudentId,
    pub name: String,
    pub section: Option<String>,
    pub department: Option<String>,
    pub course: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerRole {
    Student,
    Professor,
    Admin,
}

impl ViewerRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "professor" => Some(Self::Professor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Who is looking at the leaderboard. Passed in explicitly per request.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerContext {
    pub student_id: Option<StudentId>,
    pub role: ViewerRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortFilter {
    Overall,
    /// Same section as the viewer; falls back to everyone when the viewer
    /// has no section.
    InClass,
    Section(String),
    Department(String),
    Course(String),
}

fn same_label(a: Option<&str>, b: &str) -> bool {
    a.map(|v| v.trim() == b.trim()).unwrap_or(false)
}

impl CohortFilter {
    fn matches(&self, s: &StudentProfile, viewer_section: Option<&str>) -> bool {
        match self {
            Self::Overall => true,
            Self::InClass => match viewer_section.map(str::trim).filter(|v| !v.is_empty()) {
                Some(section) => same_label(s.section.as_deref(), section),
                None => true,
            },
            Self::Section(v) => same_label(s.section.as_deref(), v),
            Self::Department(v) => s.department.as_deref() == Some(v.as_str()),
            Self::Course(v) => s.course.as_deref() == Some(v.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StandingsOptions {
    pub filter: CohortFilter,
    pub window: Option<usize>,
    pub mode: RankingMode,
    pub gpa_mode: GpaMode,
    /// Drop subject grades of exactly 0 (nothing graded yet).
    pub exclude_zero_grades: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingRow {
    pub rank: u32,
    pub student_id: StudentId,
    pub name: String,
    pub section: Option<String>,
    pub department: Option<String>,
    pub course: Option<String>,
    pub gwa_percentage: Option<f64>,
    pub gpa: Option<f64>,
    pub subject_count: usize,
    pub is_viewer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStandingRow {
    pub rank: u32,
    pub student_id: StudentId,
    pub name: String,
    pub percentage: f64,
    pub grade: Option<f64>,
    pub is_viewer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStanding {
    pub subject_id: SubjectId,
    pub total: usize,
    pub rows: Vec<SubjectStandingRow>,
    pub viewer: Option<ViewerStanding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standings {
    pub total: usize,
    pub rows: Vec<StandingRow>,
    pub viewer: Option<ViewerStanding>,
    pub subjects: Vec<SubjectStanding>,
}

#[derive(Debug, Clone)]
struct StudentTotals {
    gwa_percentage: Option<f64>,
    gpa: Option<f64>,
    subject_count: usize,
}

pub fn build_standings(
    students: &[StudentProfile],
    entries: &[ScoreEntry],
    components: &[GradeComponent],
    units: &HashMap<SubjectId, f64>,
    viewer: Option<&ViewerContext>,
    scale: &GpaScale,
    opts: &StandingsOptions,
) -> Standings {
    let known: BTreeSet<StudentId> = students.iter().map(|s| s.student_id).collect();
    let subject_ids: BTreeSet<SubjectId> = entries
        .iter()
        .filter(|e| known.contains(&e.student_id))
        .map(|e| e.subject_id)
        .collect();

    // (student idx, subject) -> percentage
    let mut per_subject: HashMap<SubjectId, Vec<(usize, f64)>> = HashMap::new();
    let mut totals: Vec<StudentTotals> = Vec::with_capacity(students.len());

    for (idx, s) in students.iter().enumerate() {
        let mut unit_grades: Vec<UnitGrade> = Vec::new();
        for &subject_id in &subject_ids {
            let grade = compute_subject_grade(s.student_id, subject_id, entries, components);
            if grade.components.is_empty() {
                continue;
            }
            if opts.exclude_zero_grades && grade.percentage <= 0.0 {
                continue;
            }
            let u = units.get(&subject_id).copied().unwrap_or(1.0);
            unit_grades.push(UnitGrade::new(grade.percentage, u));
            per_subject
                .entry(subject_id)
                .or_default()
                .push((idx, grade.percentage));
        }
        // Zero credit units leave nothing to weigh; that is no GWA, not 0%.
        let weighed: f64 = unit_grades
            .iter()
            .map(|g| g.units)
            .filter(|u| u.is_finite() && *u > 0.0)
            .sum();
        let gwa = (weighed > 0.0).then(|| calculate_weighted_average(&unit_grades));
        totals.push(StudentTotals {
            gwa_percentage: gwa,
            gpa: gwa.and_then(|p| scale.convert(Some(p), opts.gpa_mode).value()),
            subject_count: unit_grades.len(),
        });
    }

    // Only students have a place of their own on the board.
    let viewer_id = viewer
        .filter(|v| v.role == ViewerRole::Student)
        .and_then(|v| v.student_id);
    let is_viewer = |idx: &usize| Some(students[*idx].student_id) == viewer_id;
    let viewer_section: Option<String> = viewer_id.and_then(|id| {
        students
            .iter()
            .find(|s| s.student_id == id)
            .and_then(|s| s.section.clone())
    });

    let engine = RankingEngine::new(SortDirection::Ascending).with_mode(opts.mode);

    // Students with no graded subject are not placed on the board.
    let scored: Vec<Scored<usize>> = totals
        .iter()
        .enumerate()
        .filter(|(_, t)| t.gpa.is_some())
        .map(|(idx, t)| Scored::new(idx, t.gpa))
        .collect();
    let board = engine.leaderboard(
        &scored,
        |idx| opts.filter.matches(&students[*idx], viewer_section.as_deref()),
        opts.window,
        is_viewer,
    );

    let rows = board
        .rows
        .iter()
        .map(|r| {
            let s = &students[r.identity];
            let t = &totals[r.identity];
            StandingRow {
                rank: r.rank,
                student_id: s.student_id,
                name: s.name.clone(),
                section: s.section.clone(),
                department: s.department.clone(),
                course: s.course.clone(),
                gwa_percentage: t.gwa_percentage,
                gpa: t.gpa,
                subject_count: t.subject_count,
                is_viewer: is_viewer(&r.identity),
            }
        })
        .collect();

    let mut subjects: Vec<SubjectStanding> = Vec::new();
    for &subject_id in &subject_ids {
        let Some(grades) = per_subject.get(&subject_id) else {
            continue;
        };
        let pct_by_idx: HashMap<usize, f64> = grades.iter().copied().collect();
        let cohort: Vec<Scored<usize>> = grades
            .iter()
            .map(|&(idx, pct)| Scored::new(idx, scale.convert(Some(pct), opts.gpa_mode).value()))
            .collect();
        let sb = engine.leaderboard(&cohort, |_| true, opts.window, is_viewer);
        subjects.push(SubjectStanding {
            subject_id,
            total: sb.total,
            rows: sb
                .rows
                .iter()
                .map(|r| SubjectStandingRow {
                    rank: r.rank,
                    student_id: students[r.identity].student_id,
                    name: students[r.identity].name.clone(),
                    percentage: pct_by_idx.get(&r.identity).copied().unwrap_or(0.0),
                    grade: r.score,
                    is_viewer: is_viewer(&r.identity),
                })
                .collect(),
            viewer: sb.viewer,
        });
    }

    Standings {
        total: board.total,
        rows,
        viewer: board.viewer,
        subjects,
    }
}
