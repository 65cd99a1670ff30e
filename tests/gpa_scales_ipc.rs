mod test_support;

use serde_json::json;
use test_support::{approx, num, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn convert_requires_a_scale_when_no_default_exists() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "gpa.convert",
        json!({ "percentage": 76 }),
    );
    assert_eq!(code, "no_scale");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "gpa.convert",
        json!({ "percentage": 76, "scaleId": "builtin:nope" }),
    );
    assert_eq!(code, "not_found");

    let v = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gpa.convert",
        json!({ "percentages": [76, null, "abc", "91"], "scaleId": "builtin:coarse" }),
    );
    let results = v["results"].as_array().expect("results");
    assert_eq!(results[0]["gpaString"], "3.00");
    assert!(results[1]["gpa"].is_null());
    assert_eq!(results[1]["gpaString"], "N/A");
    assert_eq!(results[2]["gpaString"], "N/A");
    assert!(approx(num(&results[3], "gpa"), 1.0));
    assert_eq!(v["scaleId"], "builtin:coarse");
    assert_eq!(v["mode"], "discrete");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn precise_mode_and_inline_scales() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (id, pct, want) in [("1", 96.0, 1.125), ("2", 50.0, 5.0), ("3", 97.5, 1.0), ("4", 72.0, 3.25)] {
        let v = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "gpa.convert",
            json!({ "percentage": pct, "scaleId": "builtin:fine", "mode": "precise" }),
        );
        assert!(approx(num(&v, "gpa"), want), "{} -> {}", pct, v);
    }

    let inline = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gpa.convert",
        json!({
            "percentage": 82,
            "scale": {
                "name": "Pass/fail-ish",
                "bands": [{ "minPercent": 75, "value": 3 }, { "minPercent": 90, "value": 1 }],
                "fallback": 5
            }
        }),
    );
    assert!(approx(num(&inline, "gpa"), 3.0));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "gpa.convert",
        json!({ "percentage": 82, "scale": { "bands": [] } }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "gpa.convert",
        json!({ "percentage": 82, "scaleId": "builtin:fine", "mode": "rounded" }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_scales_lifecycle_and_default() {
    let workspace = temp_dir("gradecalc-gpa-scales");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "gpa.scales.list", json!({}));
    let scales = listed["scales"].as_array().expect("scales");
    assert_eq!(scales.len(), 3);
    assert!(scales.iter().all(|s| s["builtin"] == true));
    assert!(listed["defaultScaleId"].is_null());

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gpa.scales.upsert",
        json!({
            "scale": {
                "name": "Department",
                "bands": [{ "minPercent": 90, "value": 1 }, { "minPercent": 75, "value": 3 }],
                "fallback": 5
            }
        }),
    );
    let scale_id = saved["id"].as_str().expect("id").to_string();
    assert!(!scale_id.is_empty());

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "gpa.scales.upsert",
        json!({ "scale": { "id": "builtin:fine", "bands": [{ "minPercent": 50, "value": 1 }] } }),
    );
    assert_eq!(code, "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gpa.scales.setDefault",
        json!({ "id": scale_id.clone() }),
    );
    let v = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gpa.convert",
        json!({ "percentage": 80 }),
    );
    assert!(approx(num(&v, "gpa"), 3.0));
    assert_eq!(v["scaleId"], scale_id.as_str());

    let listed = request_ok(&mut stdin, &mut reader, "7", "gpa.scales.list", json!({}));
    let scales = listed["scales"].as_array().expect("scales");
    assert_eq!(scales.len(), 4);
    let custom = scales
        .iter()
        .find(|s| s["id"] == scale_id.as_str())
        .expect("custom scale listed");
    assert_eq!(custom["isDefault"], true);
    assert_eq!(custom["builtin"], false);
    assert!(custom["createdAt"].as_str().is_some());

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "gpa.scales.setDefault",
            json!({ "id": "missing-scale" })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "gpa.scales.delete",
            json!({ "id": "builtin:coarse" })
        ),
        "bad_params"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gpa.scales.delete",
        json!({ "id": scale_id.clone() }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "11",
            "gpa.convert",
            json!({ "percentage": 80 })
        ),
        "no_scale"
    );

    drop(stdin);
    let _ = child.wait();

    let conn = rusqlite::Connection::open(workspace.join("gradecalc.sqlite3")).expect("open db");
    let scales: i64 = conn
        .query_row("SELECT COUNT(*) FROM gpa_scales", [], |r| r.get(0))
        .expect("count scales");
    assert_eq!(scales, 0);
    let defaults: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM settings WHERE key = 'gpa.defaultScaleId'",
            [],
            |r| r.get(0),
        )
        .expect("count defaults");
    assert_eq!(defaults, 0);
}

#[test]
fn builtin_default_and_display_settings_apply() {
    let workspace = temp_dir("gradecalc-gpa-display");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["grading"]["defaultGpaMode"], "discrete");
    assert_eq!(setup["grading"]["displayDecimals"], 2);
    assert_eq!(setup["leaderboard"]["topN"], 10);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gpa.scales.setDefault",
        json!({ "id": "builtin:coarse" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "grading", "patch": { "displayDecimals": 3 } }),
    );
    let v = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gpa.convert",
        json!({ "percentage": 76 }),
    );
    assert_eq!(v["gpaString"], "3.000");

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "setup.update",
            json!({ "section": "grading", "patch": { "displayDecimals": 9 } })
        ),
        "bad_params"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gpa.scales.setDefault",
        json!({ "id": null }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "gpa.convert",
            json!({ "percentage": 76 })
        ),
        "no_scale"
    );

    drop(stdin);
    let _ = child.wait();
}
