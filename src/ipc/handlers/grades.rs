use std::collections::BTreeSet;

use crate::calc::{
    calculate_gpa, calculate_weighted_average, class_average, compute_subject_grade_in_period,
    count_unique_assignments, round_to, simple_average, GpaMode, GpaScale, GradePeriod,
    ScoreEntry, SubjectGrade,
};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{gpa_json, parse_gpa_mode, required_i64, try_resolve_scale};
use crate::ipc::types::{AppState, Request};
use crate::payload;
use serde_json::{json, Value};

fn parse_period(req: &Request) -> Result<Option<GradePeriod>, Value> {
    match req
        .params
        .get("gradePeriod")
        .or_else(|| req.params.get("grade_period"))
    {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_str().and_then(GradePeriod::parse).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "gradePeriod must be one of: midterm, final",
                None,
            )
        }),
    }
}

fn subject_grade_json(grade: &SubjectGrade, decimals: u32) -> Value {
    let components: Vec<Value> = grade
        .components
        .iter()
        .map(|c| {
            json!({
                "componentId": c.component_id,
                "componentName": c.component_name,
                "weight": c.weight,
                "percentage": round_to(c.percentage, decimals),
                "gradedCount": c.graded_count,
                "attendanceBased": c.attendance_based,
            })
        })
        .collect();
    json!({
        "studentId": grade.student_id,
        "subjectId": grade.subject_id,
        "percentage": round_to(grade.percentage, decimals),
        "totalWeight": grade.total_weight,
        "components": components,
    })
}

/// Adds `gpa`/`gpaString` when a scale resolved. `pct` is None for
/// students with nothing graded.
fn attach_gpa(
    out: &mut Value,
    scale: Option<&GpaScale>,
    pct: Option<f64>,
    mode: GpaMode,
    decimals: usize,
) {
    let Some(scale) = scale else {
        return;
    };
    let g = gpa_json(scale.convert(pct, mode), decimals);
    out["gpa"] = g["gpa"].clone();
    out["gpaString"] = g["gpaString"].clone();
}

fn handle_subject(state: &mut AppState, req: &Request) -> Value {
    let settings = setup::grading_settings(state.db.as_ref());
    let student_id = match required_i64(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject_id = match required_i64(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period = match parse_period(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let mode = match parse_gpa_mode(req, settings.default_gpa_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let normalized = match payload::parse_entries(req.params.get("entries")) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let components = match payload::parse_components(
        req.params.get("components"),
        &normalized.embedded_components,
    ) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let scale = match try_resolve_scale(state, req) {
        Ok(s) => s,
        Err(e) => return calc_err(&req.id, e),
    };

    let grade = compute_subject_grade_in_period(
        student_id,
        subject_id,
        period,
        &normalized.entries,
        &components,
    );
    let decimals = settings.display_decimals;
    let mut out = subject_grade_json(&grade, decimals as u32);
    let pct = (!grade.components.is_empty()).then_some(grade.percentage);
    attach_gpa(&mut out, scale.as_ref(), pct, mode, decimals);
    out["droppedEntries"] = json!(normalized.dropped);
    ok(&req.id, out)
}

fn handle_gwa(state: &mut AppState, req: &Request) -> Value {
    let settings = setup::grading_settings(state.db.as_ref());
    let mode = match parse_gpa_mode(req, settings.default_gpa_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let grades = match payload::parse_unit_grades(req.params.get("subjects")) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let scale = match try_resolve_scale(state, req) {
        Ok(s) => s,
        Err(e) => return calc_err(&req.id, e),
    };

    let usable: Vec<_> = grades
        .iter()
        .copied()
        .filter(|g| g.units.is_finite() && g.units >= 0.0)
        .collect();
    let total_units: f64 = usable.iter().map(|g| g.units).sum();
    let gwa = calculate_weighted_average(&usable);
    let has_grades = total_units > 0.0;

    let decimals = settings.display_decimals;
    let mut out = json!({
        "gwa": round_to(gwa, decimals as u32),
        "totalUnits": total_units,
        "subjectCount": usable.len(),
        "scaleId": scale.as_ref().map(|s| s.id.clone()),
    });
    attach_gpa(
        &mut out,
        scale.as_ref(),
        has_grades.then_some(gwa),
        mode,
        decimals,
    );
    if let Some(scale) = scale.as_ref() {
        out["gradePointAverage"] = if has_grades {
            json!(round_to(calculate_gpa(&usable, scale), decimals as u32))
        } else {
            Value::Null
        };
    }
    ok(&req.id, out)
}

fn handle_class_summary(state: &mut AppState, req: &Request) -> Value {
    let settings = setup::grading_settings(state.db.as_ref());
    let period = match parse_period(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let mode = match parse_gpa_mode(req, settings.default_gpa_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let only_subject = req.params.get("subjectId").and_then(payload::loose_i64);
    let normalized = match payload::parse_entries(req.params.get("entries")) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let components = match payload::parse_components(
        req.params.get("components"),
        &normalized.embedded_components,
    ) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let scale = match try_resolve_scale(state, req) {
        Ok(s) => s,
        Err(e) => return calc_err(&req.id, e),
    };

    let entries: Vec<ScoreEntry> = normalized
        .entries
        .into_iter()
        .filter(|e| only_subject.map(|s| s == e.subject_id).unwrap_or(true))
        .filter(|e| period.is_none() || e.grade_period == period)
        .collect();
    let subject_ids: BTreeSet<i64> = entries.iter().map(|e| e.subject_id).collect();
    let decimals = settings.display_decimals;
    let d = decimals as u32;

    let mut subjects: Vec<Value> = Vec::with_capacity(subject_ids.len());
    for subject_id in subject_ids {
        let in_subject: Vec<ScoreEntry> = entries
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect();
        let student_ids: BTreeSet<i64> = in_subject.iter().map(|e| e.student_id).collect();

        let mut finals: Vec<f64> = Vec::with_capacity(student_ids.len());
        let mut students: Vec<Value> = Vec::with_capacity(student_ids.len());
        for student_id in student_ids {
            let grade = compute_subject_grade_in_period(
                student_id,
                subject_id,
                None,
                &in_subject,
                &components,
            );
            finals.push(grade.percentage);
            let mut row = json!({
                "studentId": student_id,
                "percentage": round_to(grade.percentage, d),
                "simpleAverage": round_to(
                    simple_average(in_subject.iter().filter(|e| e.student_id == student_id)),
                    d,
                ),
                "gradedComponents": grade.components.len(),
            });
            let pct = (!grade.components.is_empty()).then_some(grade.percentage);
            attach_gpa(&mut row, scale.as_ref(), pct, mode, decimals);
            students.push(row);
        }

        subjects.push(json!({
            "subjectId": subject_id,
            "classAverage": round_to(class_average(&finals), d),
            "assignmentCount": count_unique_assignments(&in_subject),
            "students": students,
        }));
    }

    ok(
        &req.id,
        json!({
            "subjects": subjects,
            "droppedEntries": normalized.dropped,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.subject" => Some(handle_subject(state, req)),
        "grades.gwa" => Some(handle_gwa(state, req)),
        "grades.classSummary" => Some(handle_class_summary(state, req)),
        _ => None,
    }
}
