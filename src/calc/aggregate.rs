use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::gpa::{GpaMode, GpaScale};
use super::{
    finite_or_zero, ComponentId, GradeComponent, GradePeriod, Observation, ScoreEntry, StudentId,
    SubjectId,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub component_id: ComponentId,
    pub component_name: String,
    pub weight: f64,
    pub percentage: f64,
    pub graded_count: usize,
    pub attendance_based: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGrade {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub percentage: f64,
    /// Sum of weights of the components that had graded entries.
    pub total_weight: f64,
    pub components: Vec<ComponentResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ComponentTally {
    earned: f64,
    possible: f64,
    scored: usize,
    attendance_credit: f64,
    attendance_marked: usize,
}

impl ComponentTally {
    fn add(&mut self, obs: Observation) {
        match obs {
            Observation::Scored { score, max_score } => {
                self.earned += score;
                self.possible += max_score;
                self.scored += 1;
            }
            Observation::Attendance(mark) => {
                self.attendance_credit += mark.credit();
                self.attendance_marked += 1;
            }
            Observation::Ungraded | Observation::Invalid => {}
        }
    }

    /// Percentage for the component, or None when it has nothing graded.
    /// Score entries win over attendance marks when both are present.
    fn percentage(&self) -> Option<(f64, bool)> {
        if self.scored > 0 {
            if self.possible > 0.0 {
                return Some((100.0 * self.earned / self.possible, false));
            }
            return None;
        }
        if self.attendance_marked > 0 {
            let pct = 100.0 * self.attendance_credit / (self.attendance_marked as f64);
            return Some((pct, true));
        }
        None
    }

    fn graded_count(&self) -> usize {
        if self.scored > 0 {
            self.scored
        } else {
            self.attendance_marked
        }
    }
}

pub fn compute_subject_grade(
    student_id: StudentId,
    subject_id: SubjectId,
    entries: &[ScoreEntry],
    components: &[GradeComponent],
) -> SubjectGrade {
    compute_subject_grade_in_period(student_id, subject_id, None, entries, components)
}

/// Weighted subject percentage, renormalized over the components that have
/// at least one graded entry. Ungraded categories never dilute the result.
pub fn compute_subject_grade_in_period(
    student_id: StudentId,
    subject_id: SubjectId,
    period: Option<GradePeriod>,
    entries: &[ScoreEntry],
    components: &[GradeComponent],
) -> SubjectGrade {
    let mut tallies: HashMap<ComponentId, ComponentTally> = HashMap::new();
    for e in entries {
        if e.student_id != student_id || e.subject_id != subject_id {
            continue;
        }
        if period.is_some() && e.grade_period != period {
            continue;
        }
        let Some(component_id) = e.component_id else {
            continue;
        };
        let obs = e.observation();
        if !obs.is_graded() {
            continue;
        }
        tallies.entry(component_id).or_default().add(obs);
    }

    let mut weighted_sum = 0.0_f64;
    let mut total_weight = 0.0_f64;
    let mut results: Vec<ComponentResult> = Vec::new();
    let mut seen: HashSet<ComponentId> = HashSet::new();

    for c in components {
        if !seen.insert(c.component_id) {
            continue;
        }
        let Some(weight) = c.usable_weight() else {
            continue;
        };
        let Some(tally) = tallies.get(&c.component_id) else {
            continue;
        };
        let Some((pct, attendance_based)) = tally.percentage() else {
            continue;
        };
        if !pct.is_finite() {
            continue;
        }
        weighted_sum += pct * weight;
        total_weight += weight;
        results.push(ComponentResult {
            component_id: c.component_id,
            component_name: c.component_name.clone(),
            weight,
            percentage: pct,
            graded_count: tally.graded_count(),
            attendance_based,
        });
    }

    let percentage = if total_weight > 0.0 {
        finite_or_zero(weighted_sum / total_weight)
    } else {
        0.0
    };

    SubjectGrade {
        student_id,
        subject_id,
        percentage,
        total_weight,
        components: results,
    }
}

/// One completed subject with its credit units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitGrade {
    pub percentage: f64,
    pub units: f64,
}

impl UnitGrade {
    pub fn new(percentage: f64, units: f64) -> Self {
        Self { percentage, units }
    }

    fn usable(&self) -> bool {
        self.percentage.is_finite() && self.units.is_finite() && self.units >= 0.0
    }
}

/// Credit-unit weighted average of subject percentages (GWA in percent).
pub fn calculate_weighted_average(grades: &[UnitGrade]) -> f64 {
    let mut sum = 0.0_f64;
    let mut units = 0.0_f64;
    for g in grades.iter().filter(|g| g.usable()) {
        sum += g.percentage * g.units;
        units += g.units;
    }
    if units > 0.0 {
        finite_or_zero(sum / units)
    } else {
        0.0
    }
}

/// Credit-unit weighted average of the per-subject scale values.
pub fn calculate_gpa(grades: &[UnitGrade], scale: &GpaScale) -> f64 {
    let mut points = 0.0_f64;
    let mut units = 0.0_f64;
    for g in grades.iter().filter(|g| g.usable()) {
        let Some(v) = scale.convert(Some(g.percentage), GpaMode::Discrete).value() else {
            continue;
        };
        points += v * g.units;
        units += g.units;
    }
    if units > 0.0 {
        finite_or_zero(points / units)
    } else {
        0.0
    }
}

/// Mean of student final grades; students at 0 have no graded data yet and
/// are left out.
pub fn class_average(finals: &[f64]) -> f64 {
    let valid: Vec<f64> = finals
        .iter()
        .copied()
        .filter(|g| g.is_finite() && *g > 0.0)
        .collect();
    if valid.is_empty() {
        return 0.0;
    }
    finite_or_zero(valid.iter().sum::<f64>() / (valid.len() as f64))
}

/// Unweighted mean of per-entry percentages over valid score entries.
pub fn simple_average<'a, I>(entries: I) -> f64
where
    I: IntoIterator<Item = &'a ScoreEntry>,
{
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for e in entries {
        if let Observation::Scored { score, max_score } = e.observation() {
            sum += 100.0 * score / max_score;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    finite_or_zero(sum / (count as f64))
}

/// Distinct (component, date) pairs among entries that carry a score.
pub fn count_unique_assignments(entries: &[ScoreEntry]) -> usize {
    entries
        .iter()
        .filter(|e| e.score.is_some())
        .map(|e| (e.component_id, e.date_recorded.as_deref()))
        .collect::<HashSet<_>>()
        .len()
}
