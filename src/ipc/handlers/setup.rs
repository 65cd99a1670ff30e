use crate::calc::{GpaMode, RankingMode};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Leaderboard,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Grading, SetupSection::Leaderboard];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "leaderboard" => Some(Self::Leaderboard),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Leaderboard => "leaderboard",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Leaderboard => "setup.leaderboard",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "defaultGpaMode": "discrete",
            "displayDecimals": 2
        }),
        SetupSection::Leaderboard => json!({
            "topN": 10,
            "rankingMode": "ordinal",
            "excludeZeroGrades": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "defaultGpaMode" => {
                    let mode = v.as_str().and_then(GpaMode::parse).ok_or_else(|| {
                        "defaultGpaMode must be one of: discrete, precise".to_string()
                    })?;
                    obj.insert(k.clone(), Value::String(mode.as_str().to_string()));
                }
                "displayDecimals" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 4)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Leaderboard => match k.as_str() {
                "topN" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                "rankingMode" => {
                    let mode = v.as_str().and_then(RankingMode::parse).ok_or_else(|| {
                        "rankingMode must be one of: ordinal, dense".to_string()
                    })?;
                    obj.insert(k.clone(), Value::String(mode.as_str().to_string()));
                }
                "excludeZeroGrades" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown leaderboard field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Keep defaults for anything that no longer validates.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %msg, "ignoring stored settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

fn load_or_default(conn: Option<&Connection>, section: SetupSection) -> Value {
    let Some(conn) = conn else {
        return default_section(section);
    };
    match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(section = section.name(), error = %e, "settings read failed; using defaults");
            default_section(section)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradingSettings {
    pub default_gpa_mode: GpaMode,
    pub display_decimals: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LeaderboardSettings {
    pub top_n: usize,
    pub ranking_mode: RankingMode,
    pub exclude_zero_grades: bool,
}

/// Workspace grading settings, or the defaults when no workspace is open.
pub fn grading_settings(conn: Option<&Connection>) -> GradingSettings {
    let v = load_or_default(conn, SetupSection::Grading);
    GradingSettings {
        default_gpa_mode: v
            .get("defaultGpaMode")
            .and_then(|m| m.as_str())
            .and_then(GpaMode::parse)
            .unwrap_or(GpaMode::Discrete),
        display_decimals: v
            .get("displayDecimals")
            .and_then(|d| d.as_u64())
            .unwrap_or(2) as usize,
    }
}

pub fn leaderboard_settings(conn: Option<&Connection>) -> LeaderboardSettings {
    let v = load_or_default(conn, SetupSection::Leaderboard);
    LeaderboardSettings {
        top_n: v.get("topN").and_then(|n| n.as_u64()).unwrap_or(10) as usize,
        ranking_mode: v
            .get("rankingMode")
            .and_then(|m| m.as_str())
            .and_then(RankingMode::parse)
            .unwrap_or_default(),
        exclude_zero_grades: v
            .get("excludeZeroGrades")
            .and_then(|b| b.as_bool())
            .unwrap_or(true),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        tracing::warn!(section = section.name(), error = %e, "settings write failed");
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
