use rusqlite::Connection;

use crate::calc::{CalcError, GpaMode, GpaScale, GpaValue};
use crate::db;
use crate::ipc::error::{calc_err, err};
use crate::ipc::types::{AppState, Request};
use crate::payload;

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(payload::loose_i64)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn optional_window(req: &Request, default: usize) -> Result<Option<usize>, serde_json::Value> {
    match req.params.get("topN") {
        None => Ok(Some(default)),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match payload::loose_i64(v) {
            Some(n) if n > 0 => Ok(Some(n as usize)),
            _ => Err(err(
                &req.id,
                "bad_params",
                "topN must be a positive integer or null",
                None,
            )),
        },
    }
}

pub fn parse_gpa_mode(req: &Request, default: GpaMode) -> Result<GpaMode, serde_json::Value> {
    match req.params.get("mode") {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_str().and_then(GpaMode::parse).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "mode must be one of: discrete, precise",
                None,
            )
        }),
    }
}

fn unknown_scale(id: &str) -> CalcError {
    CalcError::new("not_found", format!("unknown scale: {}", id))
        .with_details(serde_json::json!({ "scaleId": id }))
}

fn lookup_scale(conn: Option<&Connection>, id: &str) -> Result<GpaScale, CalcError> {
    if GpaScale::is_builtin_id(id) {
        return GpaScale::builtin(id).ok_or_else(|| unknown_scale(id));
    }
    let Some(conn) = conn else {
        return Err(CalcError::new(
            "no_workspace",
            "custom scales need a selected workspace",
        ));
    };
    match db::scale_get(conn, id) {
        Ok(Some(stored)) => Ok(stored.scale),
        Ok(None) => Err(unknown_scale(id)),
        Err(e) => Err(CalcError::new("db_query_failed", e.to_string())),
    }
}

/// Inline `scale`, then `scaleId`, then the workspace default. None when
/// nothing is configured; callers decide whether that is an error.
pub fn try_resolve_scale(state: &AppState, req: &Request) -> Result<Option<GpaScale>, CalcError> {
    if let Some(inline) = req.params.get("scale").filter(|v| !v.is_null()) {
        return payload::parse_scale_def("inline", inline).map(Some);
    }
    let conn = state.db.as_ref();
    if let Some(id) = req.params.get("scaleId").and_then(|v| v.as_str()) {
        return lookup_scale(conn, id.trim()).map(Some);
    }
    let Some(conn) = conn else {
        return Ok(None);
    };
    let default_id = db::default_scale_id(conn)
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    match default_id {
        Some(id) => lookup_scale(Some(conn), &id).map(Some),
        None => Ok(None),
    }
}

/// Like `try_resolve_scale`, but a missing scale is an error: there is no
/// implicit canonical table.
pub fn resolve_scale(state: &AppState, req: &Request) -> Result<GpaScale, serde_json::Value> {
    match try_resolve_scale(state, req) {
        Ok(Some(scale)) => Ok(scale),
        Ok(None) => Err(err(
            &req.id,
            "no_scale",
            "no GPA scale given and no workspace default configured",
            None,
        )),
        Err(e) => Err(calc_err(&req.id, e)),
    }
}

pub fn gpa_json(value: GpaValue, decimals: usize) -> serde_json::Value {
    serde_json::json!({
        "gpa": value.value(),
        "gpaString": value.display(decimals),
    })
}
