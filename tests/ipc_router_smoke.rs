mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, send_line, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradecalc-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").expect("workspacePath").is_null());

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["dbFile"], "gradecalc.sqlite3");
    assert!(workspace.join("gradecalc.sqlite3").is_file());

    let calls = [
        ("3", "setup.get", json!({})),
        ("4", "gpa.scales.list", json!({})),
        (
            "5",
            "gpa.convert",
            json!({ "percentage": 76, "scaleId": "builtin:coarse" }),
        ),
        (
            "6",
            "grades.subject",
            json!({ "studentId": 1, "subjectId": 1, "entries": [] }),
        ),
        ("7", "grades.gwa", json!({ "subjects": [] })),
        ("8", "grades.classSummary", json!({ "entries": [] })),
        (
            "9",
            "leaderboard.rank",
            json!({ "order": "desc", "entities": [] }),
        ),
        (
            "10",
            "leaderboard.build",
            json!({ "students": [], "entries": [], "scaleId": "builtin:fine" }),
        ),
    ];
    for (id, method, params) in calls {
        let v = request(&mut stdin, &mut reader, id, method, params);
        assert_eq!(
            v.get("ok").and_then(|x| x.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            v
        );
    }

    let code = request_err(&mut stdin, &mut reader, "11", "grades.median", json!({}));
    assert_eq!(code, "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_keeps_going() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let reply = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["code"], "bad_json");

    let health = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
    assert!(health.get("version").is_some());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    assert_eq!(
        request_err(&mut stdin, &mut reader, "1", "setup.get", json!({})),
        "no_workspace"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "gpa.scales.setDefault",
            json!({ "id": "builtin:fine" })
        ),
        "no_workspace"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "workspace.select",
            json!({})
        ),
        "bad_params"
    );

    drop(stdin);
    let _ = child.wait();
}
