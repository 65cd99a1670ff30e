//! Request payloads as the host sends them: loosely typed JSON with
//! snake_case or camelCase keys, numbers that may arrive as strings, and
//! nested relation objects. Everything is normalized here once so the
//! computation core only ever sees strict types.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::calc::standings::{CohortFilter, StudentProfile, ViewerContext, ViewerRole};
use crate::calc::{
    AttendanceMark, CalcError, ComponentId, GpaBand, GpaScale, GradeComponent, GradePeriod,
    ScoreEntry, SubjectId, UnitGrade,
};

pub fn loose_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

pub fn loose_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|x| x.fract() == 0.0).map(|x| x as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn loose_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Relations sometimes come back as a one-element array instead of an object.
fn relation(v: &Value) -> Option<&Value> {
    match v {
        Value::Object(_) => Some(v),
        Value::Array(items) => items.first().filter(|x| x.is_object()),
        _ => None,
    }
}

fn relation_field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = relation(v)?;
    keys.iter().find_map(|k| obj.get(*k).filter(|x| !x.is_null()))
}

fn require_array<'a>(raw: Option<&'a Value>, name: &str) -> Result<&'a Vec<Value>, CalcError> {
    match raw {
        None | Some(Value::Null) => Err(CalcError::new(
            "bad_params",
            format!("missing {}", name),
        )),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CalcError::new(
            "bad_params",
            format!("{} must be an array", name),
        )),
    }
}

fn optional_array<'a>(raw: Option<&'a Value>, name: &str) -> Result<&'a [Value], CalcError> {
    match raw {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(CalcError::new(
            "bad_params",
            format!("{} must be an array", name),
        )),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawComponent {
    #[serde(alias = "componentId")]
    component_id: Value,
    #[serde(alias = "componentName", alias = "name")]
    component_name: Value,
    #[serde(alias = "weightPercentage", alias = "weight")]
    weight_percentage: Value,
}

impl RawComponent {
    fn normalize(self) -> Option<GradeComponent> {
        let component_id = loose_i64(&self.component_id)?;
        Some(GradeComponent {
            component_id,
            component_name: loose_string(&self.component_name).unwrap_or_default(),
            weight_percentage: loose_f64(&self.weight_percentage).filter(|w| *w >= 0.0),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    #[serde(alias = "studentId")]
    student_id: Value,
    #[serde(alias = "subjectId")]
    subject_id: Value,
    #[serde(alias = "componentId")]
    component_id: Value,
    score: Value,
    #[serde(alias = "maxScore", alias = "total")]
    max_score: Value,
    attendance: Value,
    #[serde(alias = "gradePeriod")]
    grade_period: Value,
    #[serde(alias = "dateRecorded", alias = "date")]
    date_recorded: Value,
    #[serde(alias = "class")]
    classes: Value,
    #[serde(alias = "gradeComponents", alias = "component")]
    grade_components: Value,
}

impl RawEntry {
    fn embedded_component(&self) -> Option<GradeComponent> {
        let obj = relation(&self.grade_components)?;
        serde_json::from_value::<RawComponent>(obj.clone())
            .ok()
            .and_then(RawComponent::normalize)
    }

    fn normalize(&self) -> Option<ScoreEntry> {
        let student_id = loose_i64(&self.student_id)?;
        let subject_id = loose_i64(&self.subject_id).or_else(|| {
            relation_field(&self.classes, &["subject_id", "subjectId"]).and_then(loose_i64)
        })?;
        let component_id = loose_i64(&self.component_id).or_else(|| {
            relation_field(&self.grade_components, &["component_id", "componentId"])
                .and_then(loose_i64)
        });
        Some(ScoreEntry {
            student_id,
            subject_id,
            component_id,
            score: loose_f64(&self.score),
            max_score: loose_f64(&self.max_score).unwrap_or(0.0),
            attendance: self.attendance.as_str().and_then(AttendanceMark::parse),
            grade_period: self.grade_period.as_str().and_then(GradePeriod::parse),
            date_recorded: loose_string(&self.date_recorded),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedEntries {
    pub entries: Vec<ScoreEntry>,
    /// Components found embedded in entry rows.
    pub embedded_components: Vec<GradeComponent>,
    /// Rows dropped for lacking a usable student or subject id.
    pub dropped: usize,
}

pub fn parse_entries(raw: Option<&Value>) -> Result<NormalizedEntries, CalcError> {
    let items = require_array(raw, "entries")?;
    let mut out = NormalizedEntries::default();
    for item in items {
        let Ok(row) = serde_json::from_value::<RawEntry>(item.clone()) else {
            out.dropped += 1;
            continue;
        };
        if let Some(c) = row.embedded_component() {
            out.embedded_components.push(c);
        }
        match row.normalize() {
            Some(e) => out.entries.push(e),
            None => out.dropped += 1,
        }
    }
    if out.dropped > 0 {
        tracing::debug!(dropped = out.dropped, kept = out.entries.len(), "entries normalized");
    }
    Ok(out)
}

/// Explicit component metadata first, then anything embedded in entries.
/// The first definition of an id wins.
pub fn parse_components(
    raw: Option<&Value>,
    embedded: &[GradeComponent],
) -> Result<Vec<GradeComponent>, CalcError> {
    let items = optional_array(raw, "components")?;
    let mut out: Vec<GradeComponent> = Vec::new();
    for item in items {
        let Ok(rc) = serde_json::from_value::<RawComponent>(item.clone()) else {
            continue;
        };
        if let Some(c) = rc.normalize() {
            push_unique(&mut out, c);
        }
    }
    for c in embedded {
        push_unique(&mut out, c.clone());
    }
    Ok(out)
}

fn push_unique(out: &mut Vec<GradeComponent>, c: GradeComponent) {
    let id: ComponentId = c.component_id;
    if !out.iter().any(|x| x.component_id == id) {
        out.push(c);
    }
}

/// `[{percentage, units}]`; missing units count as 1, rows without a
/// percentage are skipped.
pub fn parse_unit_grades(raw: Option<&Value>) -> Result<Vec<UnitGrade>, CalcError> {
    let items = require_array(raw, "subjects")?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(percentage) = item
            .get("percentage")
            .or_else(|| item.get("grade"))
            .and_then(loose_f64)
        else {
            continue;
        };
        let units = item
            .get("units")
            .or_else(|| item.get("credits"))
            .and_then(loose_f64)
            .unwrap_or(1.0);
        out.push(UnitGrade::new(percentage, units));
    }
    Ok(out)
}

/// Accepts `[{subjectId, units}]` or `{"<subjectId>": units}`.
pub fn parse_units_map(raw: Option<&Value>) -> Result<HashMap<SubjectId, f64>, CalcError> {
    let mut out = HashMap::new();
    match raw {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (k, v) in map {
                if let (Ok(id), Some(u)) = (k.trim().parse::<i64>(), loose_f64(v)) {
                    out.insert(id, u);
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                let id = item
                    .get("subjectId")
                    .or_else(|| item.get("subject_id"))
                    .and_then(loose_i64);
                let units = item.get("units").and_then(loose_f64);
                if let (Some(id), Some(u)) = (id, units) {
                    out.insert(id, u);
                }
            }
        }
        Some(_) => {
            return Err(CalcError::new(
                "bad_params",
                "units must be an object or an array",
            ))
        }
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStudent {
    #[serde(alias = "studentId", alias = "id")]
    student_id: Value,
    name: Value,
    #[serde(alias = "firstName")]
    first_name: Value,
    #[serde(alias = "lastName")]
    last_name: Value,
    #[serde(alias = "sectionName", alias = "section_name")]
    section: Value,
    #[serde(alias = "departmentName", alias = "department_name")]
    department: Value,
    #[serde(alias = "courseName", alias = "course_name")]
    course: Value,
}

pub fn parse_students(raw: Option<&Value>) -> Result<Vec<StudentProfile>, CalcError> {
    let items = require_array(raw, "students")?;
    let mut out: Vec<StudentProfile> = Vec::with_capacity(items.len());
    for item in items {
        let Ok(rs) = serde_json::from_value::<RawStudent>(item.clone()) else {
            continue;
        };
        let Some(student_id) = loose_i64(&rs.student_id) else {
            continue;
        };
        if out.iter().any(|s| s.student_id == student_id) {
            continue;
        }
        let name = loose_string(&rs.name).unwrap_or_else(|| {
            let first = loose_string(&rs.first_name).unwrap_or_default();
            let last = loose_string(&rs.last_name).unwrap_or_default();
            format!("{} {}", first, last).trim().to_string()
        });
        out.push(StudentProfile {
            student_id,
            name,
            section: loose_string(&rs.section),
            department: loose_string(&rs.department),
            course: loose_string(&rs.course),
        });
    }
    Ok(out)
}

pub fn parse_viewer(raw: Option<&Value>) -> Result<Option<ViewerContext>, CalcError> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "viewer must be an object"));
    };
    let student_id = obj
        .get("studentId")
        .or_else(|| obj.get("student_id"))
        .and_then(loose_i64);
    let role = match obj.get("role").and_then(|v| v.as_str()) {
        None => ViewerRole::Student,
        Some(s) => ViewerRole::parse(s).ok_or_else(|| {
            CalcError::new(
                "bad_params",
                "viewer.role must be one of: student, professor, admin",
            )
        })?,
    };
    Ok(Some(ViewerContext { student_id, role }))
}

/// `"overall" | "inClass" | {"section": ..} | {"department": ..} | {"course": ..}`
pub fn parse_cohort_filter(raw: Option<&Value>) -> Result<CohortFilter, CalcError> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok(CohortFilter::Overall);
    };
    if let Some(s) = raw.as_str() {
        return match s.trim().to_ascii_lowercase().as_str() {
            "" | "overall" | "all" => Ok(CohortFilter::Overall),
            "inclass" | "in class" | "in_class" => Ok(CohortFilter::InClass),
            _ => Err(CalcError::new(
                "bad_params",
                "filter must be 'overall', 'inClass' or an object",
            )),
        };
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "filter must be a string or object"));
    };
    if let Some(v) = obj.get("section").and_then(loose_string) {
        return Ok(CohortFilter::Section(v));
    }
    if let Some(v) = obj.get("department").and_then(loose_string) {
        return Ok(CohortFilter::Department(v));
    }
    if let Some(v) = obj.get("course").and_then(loose_string) {
        return Ok(CohortFilter::Course(v));
    }
    Err(CalcError::new(
        "bad_params",
        "filter object needs one of: section, department, course",
    ))
}

/// Inline or stored scale definition: `{name, bands: [{minPercent, value}],
/// fallback, preciseFloor}`.
pub fn parse_scale_def(id: &str, raw: &Value) -> Result<GpaScale, CalcError> {
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "scale must be an object"));
    };
    let name = obj
        .get("name")
        .and_then(loose_string)
        .unwrap_or_else(|| "Custom".to_string());
    let bands_raw = require_array(obj.get("bands"), "scale.bands")?;
    let mut bands: Vec<GpaBand> = Vec::with_capacity(bands_raw.len());
    for (i, b) in bands_raw.iter().enumerate() {
        let min_percent = b
            .get("minPercent")
            .or_else(|| b.get("min_percent"))
            .and_then(loose_f64);
        let value = b.get("value").and_then(loose_f64);
        let (Some(min_percent), Some(value)) = (min_percent, value) else {
            return Err(CalcError::new(
                "bad_params",
                format!("scale.bands[{}] needs numeric minPercent and value", i),
            ));
        };
        bands.push(GpaBand { min_percent, value });
    }
    let fallback = match obj.get("fallback") {
        None | Some(Value::Null) => 5.0,
        Some(v) => loose_f64(v)
            .ok_or_else(|| CalcError::new("bad_params", "scale.fallback must be a number"))?,
    };
    let precise_floor = match obj.get("preciseFloor").or_else(|| obj.get("precise_floor")) {
        None | Some(Value::Null) => None,
        Some(v) => Some(loose_f64(v).ok_or_else(|| {
            CalcError::new("bad_params", "scale.preciseFloor must be a number")
        })?),
    };
    GpaScale::new(id, name, bands, fallback, precise_floor)
}
