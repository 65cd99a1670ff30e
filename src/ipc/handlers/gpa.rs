use crate::calc::GpaScale;
use crate::db;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, gpa_json, parse_gpa_mode, required_str, resolve_scale};
use crate::ipc::types::{AppState, Request};
use crate::payload;
use serde_json::{json, Value};

fn scale_json(scale: &GpaScale, builtin: bool, is_default: bool) -> Value {
    let mut v = json!(scale);
    v["builtin"] = json!(builtin);
    v["isDefault"] = json!(is_default);
    v
}

fn handle_scales_list(state: &mut AppState, req: &Request) -> Value {
    let conn = state.db.as_ref();
    let default_id = match conn.map(db::default_scale_id).transpose() {
        Ok(v) => v.flatten(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let is_default = |id: &str| default_id.as_deref() == Some(id);

    let mut scales: Vec<Value> = GpaScale::builtins()
        .iter()
        .map(|s| scale_json(s, true, is_default(&s.id)))
        .collect();
    if let Some(conn) = conn {
        let stored = match db::scales_list(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        for s in stored {
            let mut v = scale_json(&s.scale, false, is_default(&s.scale.id));
            v["createdAt"] = json!(s.created_at);
            v["updatedAt"] = json!(s.updated_at);
            scales.push(v);
        }
    }
    ok(
        &req.id,
        json!({ "scales": scales, "defaultScaleId": default_id }),
    )
}

fn handle_scales_upsert(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("scale").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "scale must be an object", None);
    };
    let id = raw
        .get("id")
        .or_else(|| req.params.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if GpaScale::is_builtin_id(&id) {
        return err(
            &req.id,
            "bad_params",
            "built-in scales are read-only",
            Some(json!({ "id": id })),
        );
    }
    let scale = match payload::parse_scale_def(&id, raw) {
        Ok(s) => s,
        Err(e) => return calc_err(&req.id, e),
    };
    let stored_id = match db::scale_upsert(conn, &scale) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "gpa scale upsert failed");
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    };
    tracing::info!(scale_id = %stored_id, bands = scale.bands.len(), "gpa scale saved");
    let saved = GpaScale {
        id: stored_id.clone(),
        ..scale
    };
    ok(&req.id, json!({ "id": stored_id, "scale": saved }))
}

fn handle_scales_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if GpaScale::is_builtin_id(&id) {
        return err(&req.id, "bad_params", "built-in scales are read-only", None);
    }
    match db::scale_delete(conn, &id) {
        Ok(true) => ok(&req.id, json!({ "deleted": true })),
        Ok(false) => err(
            &req.id,
            "not_found",
            format!("unknown scale: {}", id),
            None,
        ),
        Err(e) => {
            tracing::warn!(scale_id = %id, error = %e, "gpa scale delete failed");
            err(&req.id, "db_update_failed", e.to_string(), None)
        }
    }
}

fn handle_scales_set_default(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match req.params.get("id") {
        None => return err(&req.id, "bad_params", "missing id", None),
        Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => return err(&req.id, "bad_params", "id must be a string or null", None),
    };

    let Some(id) = id else {
        if let Err(e) = db::settings_delete(conn, db::DEFAULT_SCALE_KEY) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        return ok(&req.id, json!({ "defaultScaleId": null }));
    };

    let exists = if GpaScale::is_builtin_id(&id) {
        GpaScale::builtin(&id).is_some()
    } else {
        match db::scale_get(conn, &id) {
            Ok(v) => v.is_some(),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };
    if !exists {
        return err(
            &req.id,
            "not_found",
            format!("unknown scale: {}", id),
            None,
        );
    }
    if let Err(e) = db::settings_set_json(conn, db::DEFAULT_SCALE_KEY, &json!(id)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "defaultScaleId": id }))
}

fn handle_convert(state: &mut AppState, req: &Request) -> Value {
    let settings = setup::grading_settings(state.db.as_ref());
    let mode = match parse_gpa_mode(req, settings.default_gpa_mode) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let scale = match resolve_scale(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let decimals = settings.display_decimals;
    let convert = |v: &Value| gpa_json(scale.convert(payload::loose_f64(v), mode), decimals);

    let mut out = if let Some(list) = req.params.get("percentages") {
        let Some(items) = list.as_array() else {
            return err(&req.id, "bad_params", "percentages must be an array", None);
        };
        json!({ "results": items.iter().map(convert).collect::<Vec<_>>() })
    } else {
        match req.params.get("percentage") {
            Some(v) => convert(v),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "missing percentage or percentages",
                    None,
                )
            }
        }
    };
    out["scaleId"] = json!(scale.id);
    out["mode"] = json!(mode.as_str());
    ok(&req.id, out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "gpa.scales.list" => Some(handle_scales_list(state, req)),
        "gpa.scales.upsert" => Some(handle_scales_upsert(state, req)),
        "gpa.scales.delete" => Some(handle_scales_delete(state, req)),
        "gpa.scales.setDefault" => Some(handle_scales_set_default(state, req)),
        "gpa.convert" => Some(handle_convert(state, req)),
        _ => None,
    }
}
