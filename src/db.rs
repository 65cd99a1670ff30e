use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::calc::{GpaBand, GpaScale};

pub const DB_FILE_NAME: &str = "gradecalc.sqlite3";

/// Settings key holding the id of the scale used when a request names none.
pub const DEFAULT_SCALE_KEY: &str = "gpa.defaultScaleId";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS gpa_scales(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            bands_json TEXT NOT NULL,
            fallback REAL NOT NULL,
            precise_floor REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_gpa_scales_name ON gpa_scales(name)",
        [],
    )?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
        (key, serde_json::to_string(value)?, now_rfc3339()),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoredScale {
    pub scale: GpaScale,
    pub created_at: String,
    pub updated_at: String,
}

type ScaleRow = (String, String, String, f64, Option<f64>, String, String);

fn scale_from_row(row: ScaleRow) -> anyhow::Result<StoredScale> {
    let (id, name, bands_json, fallback, precise_floor, created_at, updated_at) = row;
    let bands: Vec<GpaBand> = serde_json::from_str(&bands_json)?;
    let scale = GpaScale::new(id, name, bands, fallback, precise_floor)?;
    Ok(StoredScale {
        scale,
        created_at,
        updated_at,
    })
}

pub fn scales_list(conn: &Connection) -> anyhow::Result<Vec<StoredScale>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, bands_json, fallback, precise_floor, created_at, updated_at
         FROM gpa_scales
         ORDER BY name, id",
    )?;
    let rows: Vec<ScaleRow> = stmt
        .query_map([], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.0.clone();
        match scale_from_row(row) {
            Ok(s) => out.push(s),
            // A damaged row must not hide the rest of the list.
            Err(e) => tracing::warn!(scale_id = %id, error = %e, "skipping unreadable gpa scale"),
        }
    }
    Ok(out)
}

pub fn scale_get(conn: &Connection, id: &str) -> anyhow::Result<Option<StoredScale>> {
    let row: Option<ScaleRow> = conn
        .query_row(
            "SELECT id, name, bands_json, fallback, precise_floor, created_at, updated_at
             FROM gpa_scales
             WHERE id = ?",
            [id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    row.map(scale_from_row).transpose()
}

/// Insert or replace a workspace scale. A scale without an id gets a fresh
/// uuid; the stored id is returned.
pub fn scale_upsert(conn: &Connection, scale: &GpaScale) -> anyhow::Result<String> {
    let id = if scale.id.trim().is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        scale.id.clone()
    };
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO gpa_scales(id, name, bands_json, fallback, precise_floor, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            bands_json = excluded.bands_json,
            fallback = excluded.fallback,
            precise_floor = excluded.precise_floor,
            updated_at = excluded.updated_at",
        (
            &id,
            &scale.name,
            serde_json::to_string(&scale.bands)?,
            scale.fallback,
            scale.precise_floor,
            &now,
            &now,
        ),
    )?;
    Ok(id)
}

pub fn scale_delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM gpa_scales WHERE id = ?", [id])?;
    if n > 0 {
        let default_id = settings_get_json(conn, DEFAULT_SCALE_KEY)?;
        if default_id.as_ref().and_then(|v| v.as_str()) == Some(id) {
            settings_delete(conn, DEFAULT_SCALE_KEY)?;
        }
    }
    Ok(n > 0)
}

pub fn default_scale_id(conn: &Connection) -> anyhow::Result<Option<String>> {
    Ok(settings_get_json(conn, DEFAULT_SCALE_KEY)?
        .and_then(|v| v.as_str().map(|s| s.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let conn = open_db(&temp_dir("gradecalc-db-settings")).expect("open db");
        assert!(settings_get_json(&conn, "grading").expect("get").is_none());
        settings_set_json(&conn, "grading", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "grading", &serde_json::json!({ "a": 2 })).expect("set");
        let v = settings_get_json(&conn, "grading").expect("get").expect("value");
        assert_eq!(v["a"], 2);
    }

    #[test]
    fn scale_upsert_assigns_id_and_delete_clears_default() {
        let conn = open_db(&temp_dir("gradecalc-db-scales")).expect("open db");
        let scale = GpaScale::new(
            "",
            "Department",
            vec![
                GpaBand {
                    min_percent: 90.0,
                    value: 1.0,
                },
                GpaBand {
                    min_percent: 75.0,
                    value: 3.0,
                },
            ],
            5.0,
            None,
        )
        .expect("scale");
        let id = scale_upsert(&conn, &scale).expect("upsert");
        assert!(!id.is_empty());

        let stored = scale_get(&conn, &id).expect("get").expect("stored");
        assert_eq!(stored.scale.name, "Department");
        assert_eq!(stored.scale.bands.len(), 2);
        assert_eq!(scales_list(&conn).expect("list").len(), 1);

        settings_set_json(&conn, DEFAULT_SCALE_KEY, &serde_json::json!(id)).expect("default");
        assert!(scale_delete(&conn, &id).expect("delete"));
        assert_eq!(default_scale_id(&conn).expect("default id"), None);
        assert!(!scale_delete(&conn, &id).expect("delete again"));
    }
}
