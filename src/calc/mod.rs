//! Grade computation core: per-subject aggregation, GPA conversion and
//! ranking. Everything in here is pure; callers hand in fully fetched
//! collections and get plain values back.

pub mod aggregate;
pub mod gpa;
pub mod ranking;
pub mod standings;

use serde::{Deserialize, Serialize};

pub use aggregate::{
    calculate_gpa, calculate_weighted_average, class_average, compute_subject_grade_in_period,
    count_unique_assignments, simple_average, SubjectGrade, UnitGrade,
};
pub use gpa::{GpaBand, GpaMode, GpaScale, GpaValue};
pub use ranking::{RankingEngine, RankingMode, Scored, SortDirection};

pub type StudentId = i64;
pub type SubjectId = i64;
pub type ComponentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    Present,
    Late,
    Absent,
}

impl AttendanceMark {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "late" => Some(Self::Late),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    /// Credit earned by one attendance mark, out of 1.
    pub fn credit(self) -> f64 {
        match self {
            Self::Present => 1.0,
            Self::Late => 0.5,
            Self::Absent => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradePeriod {
    Midterm,
    Final,
}

impl GradePeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midterm" => Some(Self::Midterm),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// One recorded performance observation, already normalized at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub component_id: Option<ComponentId>,
    pub score: Option<f64>,
    pub max_score: f64,
    pub attendance: Option<AttendanceMark>,
    pub grade_period: Option<GradePeriod>,
    pub date_recorded: Option<String>,
}

#[cfg(test)]
impl ScoreEntry {
    pub fn scored(
        student_id: StudentId,
        subject_id: SubjectId,
        component_id: ComponentId,
        score: f64,
        max_score: f64,
    ) -> Self {
        Self {
            student_id,
            subject_id,
            component_id: Some(component_id),
            score: Some(score),
            max_score,
            attendance: None,
            grade_period: None,
            date_recorded: None,
        }
    }

    pub fn attendance(
        student_id: StudentId,
        subject_id: SubjectId,
        component_id: ComponentId,
        mark: AttendanceMark,
    ) -> Self {
        Self {
            student_id,
            subject_id,
            component_id: Some(component_id),
            score: None,
            max_score: 0.0,
            attendance: Some(mark),
            grade_period: None,
            date_recorded: None,
        }
    }
}

impl ScoreEntry {
    pub fn observation(&self) -> Observation {
        match self.score {
            Some(score) if score.is_finite() && self.max_score.is_finite() => {
                if self.max_score > 0.0 {
                    Observation::Scored {
                        score,
                        max_score: self.max_score,
                    }
                } else {
                    Observation::Invalid
                }
            }
            Some(_) => Observation::Invalid,
            None => match self.attendance {
                Some(mark) => Observation::Attendance(mark),
                None => Observation::Ungraded,
            },
        }
    }
}

/// What a single entry contributes to its component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Ungraded,
    Invalid,
    Scored { score: f64, max_score: f64 },
    Attendance(AttendanceMark),
}

impl Observation {
    pub fn is_graded(self) -> bool {
        matches!(self, Self::Scored { .. } | Self::Attendance(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeComponent {
    pub component_id: ComponentId,
    pub component_name: String,
    pub weight_percentage: Option<f64>,
}

#[cfg(test)]
impl GradeComponent {
    pub fn new(component_id: ComponentId, name: &str, weight_percentage: f64) -> Self {
        Self {
            component_id,
            component_name: name.to_string(),
            weight_percentage: Some(weight_percentage),
        }
    }
}

impl GradeComponent {
    pub fn usable_weight(&self) -> Option<f64> {
        self.weight_percentage.filter(|w| w.is_finite() && *w >= 0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for CalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Half-up rounding for display: `round(x * 10^d) / 10^d`.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let factor = 10_f64.powi(decimals as i32);
    (x * factor).round() / factor
}
