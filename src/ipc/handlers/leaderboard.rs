use std::collections::HashMap;

use crate::calc::standings::{
    build_standings, CohortFilter, Standings, StandingsOptions, StudentProfile, ViewerContext,
};
use crate::calc::{
    round_to, CalcError, GradeComponent, RankingEngine, RankingMode, Scored, SortDirection,
    SubjectId,
};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{optional_window, parse_gpa_mode, resolve_scale};
use crate::ipc::types::{AppState, Request};
use crate::payload::{self, NormalizedEntries};
use serde_json::{json, Map, Value};

fn parse_ranking_mode(req: &Request, default: RankingMode) -> Result<RankingMode, Value> {
    match req.params.get("rankingMode") {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_str().and_then(RankingMode::parse).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "rankingMode must be one of: ordinal, dense",
                None,
            )
        }),
    }
}

/// `"12"`, `12` and `12.0` name the same thing.
fn loose_eq(have: &Value, want: &Value) -> bool {
    match (have, want) {
        (Value::String(a), Value::String(b)) => a.trim() == b.trim(),
        (a, b) => match (payload::loose_f64(a), payload::loose_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn attr_matches(entity: &Value, wanted: &Map<String, Value>) -> bool {
    wanted
        .iter()
        .all(|(k, want)| entity.get(k).map(|have| loose_eq(have, want)).unwrap_or(false))
}

/// Rank caller-scored entities: `[{id, score, ..attrs}]`. `filter` is an
/// attribute object every kept entity must match.
fn handle_rank(state: &mut AppState, req: &Request) -> Value {
    let settings = setup::leaderboard_settings(state.db.as_ref());
    let Some(order_raw) = req.params.get("order").and_then(|v| v.as_str()) else {
        return err(
            &req.id,
            "bad_params",
            "missing order (asc or desc)",
            None,
        );
    };
    let Some(direction) = SortDirection::parse(order_raw) else {
        return err(&req.id, "bad_params", "order must be asc or desc", None);
    };
    let mode = match parse_ranking_mode(req, settings.ranking_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let window = match optional_window(req, settings.top_n) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let Some(items) = req.params.get("entities").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "entities must be an array", None);
    };
    let filter = match req.params.get("filter") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return err(&req.id, "bad_params", "filter must be an object", None),
    };
    let viewer_id = req.params.get("viewerId").filter(|v| !v.is_null());

    let entities: Vec<Scored<usize>> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| Scored::new(idx, item.get("score").and_then(payload::loose_f64)))
        .collect();
    let is_viewer = |idx: &usize| match viewer_id {
        Some(v) => items[*idx].get("id").map(|id| loose_eq(id, v)).unwrap_or(false),
        None => false,
    };

    let engine = RankingEngine::new(direction).with_mode(mode);
    let board = engine.leaderboard(
        &entities,
        |idx| attr_matches(&items[*idx], &filter),
        window,
        is_viewer,
    );

    let rows: Vec<Value> = board
        .rows
        .iter()
        .map(|r| {
            json!({
                "id": items[r.identity].get("id").cloned().unwrap_or(Value::Null),
                "score": r.score,
                "rank": r.rank,
            })
        })
        .collect();
    ok(
        &req.id,
        json!({
            "rows": rows,
            "total": board.total,
            "viewer": board.viewer,
        }),
    )
}

fn round_standings(standings: &mut Standings, decimals: u32) {
    for row in &mut standings.rows {
        row.gwa_percentage = row.gwa_percentage.map(|p| round_to(p, decimals));
    }
    for subject in &mut standings.subjects {
        for row in &mut subject.rows {
            row.percentage = round_to(row.percentage, decimals);
        }
    }
}

struct BuildInputs {
    students: Vec<StudentProfile>,
    normalized: NormalizedEntries,
    components: Vec<GradeComponent>,
    units: HashMap<SubjectId, f64>,
    viewer: Option<ViewerContext>,
    filter: CohortFilter,
}

fn parse_build_inputs(req: &Request) -> Result<BuildInputs, CalcError> {
    let students = payload::parse_students(req.params.get("students"))?;
    let normalized = payload::parse_entries(req.params.get("entries"))?;
    let components = payload::parse_components(
        req.params.get("components"),
        &normalized.embedded_components,
    )?;
    Ok(BuildInputs {
        students,
        components,
        normalized,
        units: payload::parse_units_map(req.params.get("units"))?,
        viewer: payload::parse_viewer(req.params.get("viewer"))?,
        filter: payload::parse_cohort_filter(req.params.get("filter"))?,
    })
}

fn handle_build(state: &mut AppState, req: &Request) -> Value {
    let grading = setup::grading_settings(state.db.as_ref());
    let board = setup::leaderboard_settings(state.db.as_ref());

    let gpa_mode = match parse_gpa_mode(req, grading.default_gpa_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let mode = match parse_ranking_mode(req, board.ranking_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let window = match optional_window(req, board.top_n) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let exclude_zero_grades = match req.params.get("excludeZeroGrades") {
        None | Some(Value::Null) => board.exclude_zero_grades,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return err(
                &req.id,
                "bad_params",
                "excludeZeroGrades must be boolean",
                None,
            )
        }
    };

    let BuildInputs {
        students,
        normalized,
        components,
        units,
        viewer,
        filter,
    } = match parse_build_inputs(req) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let scale = match resolve_scale(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let opts = StandingsOptions {
        filter,
        window,
        mode,
        gpa_mode,
        exclude_zero_grades,
    };
    let mut standings = build_standings(
        &students,
        &normalized.entries,
        &components,
        &units,
        viewer.as_ref(),
        &scale,
        &opts,
    );
    tracing::debug!(
        students = students.len(),
        ranked = standings.total,
        subjects = standings.subjects.len(),
        "leaderboard built"
    );
    round_standings(&mut standings, grading.display_decimals as u32);

    let mut out = json!(standings);
    out["scaleId"] = json!(scale.id);
    out["droppedEntries"] = json!(normalized.dropped);
    ok(&req.id, out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "leaderboard.rank" => Some(handle_rank(state, req)),
        "leaderboard.build" => Some(handle_build(state, req)),
        _ => None,
    }
}
