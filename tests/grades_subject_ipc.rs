mod test_support;

use serde_json::json;
use test_support::{approx, num, request_err, request_ok, spawn_sidecar};

#[test]
fn subject_grade_weights_components_and_converts_on_request() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let components = json!([
        { "component_id": 1, "component_name": "Quizzes", "weight_percentage": 30 },
        { "component_id": 2, "component_name": "Exams", "weight_percentage": 70 }
    ]);
    let entries = json!([
        { "student_id": 1, "subject_id": 10, "component_id": 1, "score": 18, "max_score": 20 },
        { "student_id": 1, "subject_id": 10, "component_id": 2, "score": 56, "max_score": 80 },
        { "student_id": 2, "subject_id": 10, "component_id": 2, "score": 10, "max_score": 80 }
    ]);

    let plain = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.subject",
        json!({
            "studentId": 1,
            "subjectId": 10,
            "entries": entries.clone(),
            "components": components.clone()
        }),
    );
    assert!(approx(num(&plain, "percentage"), 76.0));
    assert!(approx(num(&plain, "totalWeight"), 100.0));
    assert_eq!(plain["components"].as_array().map(|c| c.len()), Some(2));
    assert!(plain.get("gpa").is_none(), "no scale, no gpa: {}", plain);

    let converted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.subject",
        json!({
            "studentId": 1,
            "subjectId": 10,
            "entries": entries,
            "components": components,
            "scaleId": "builtin:coarse"
        }),
    );
    assert!(approx(num(&converted, "gpa"), 3.0));
    assert_eq!(converted["gpaString"], "3.00");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn ungraded_components_are_renormalized_away() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let v = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.subject",
        json!({
            "studentId": 7,
            "subjectId": 3,
            "components": [
                { "componentId": 1, "componentName": "Quizzes", "weightPercentage": 20 },
                { "componentId": 2, "componentName": "Projects", "weightPercentage": 30 },
                { "componentId": 3, "componentName": "Exams", "weightPercentage": 50 }
            ],
            "entries": [
                { "studentId": 7, "subjectId": 3, "componentId": 1, "score": 8, "maxScore": 10 },
                { "studentId": 7, "subjectId": 3, "componentId": 2, "score": 6, "maxScore": 10 },
                { "studentId": 7, "subjectId": 3, "componentId": 3, "score": null, "maxScore": 100 }
            ]
        }),
    );
    // (80 * 20 + 60 * 30) / 50
    assert!(approx(num(&v, "percentage"), 68.0));
    assert!(approx(num(&v, "totalWeight"), 50.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn attendance_marks_score_as_present_late_absent() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mark = |m: &str| {
        json!({ "student_id": 1, "subject_id": 5, "component_id": 9, "attendance": m })
    };
    let v = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.subject",
        json!({
            "studentId": 1,
            "subjectId": 5,
            "components": [{ "component_id": 9, "component_name": "Attendance", "weight_percentage": 10 }],
            "entries": [mark("present"), mark("present"), mark("late"), mark("absent")]
        }),
    );
    assert!(approx(num(&v, "percentage"), 62.5));
    assert_eq!(v["components"][0]["attendanceBased"], true);
    assert_eq!(v["components"][0]["gradedCount"], 4);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn loose_payloads_are_normalized_and_bad_rows_dropped() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let v = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.subject",
        json!({
            "studentId": "4",
            "subjectId": "12",
            "entries": [
                {
                    "student_id": "4",
                    "score": "45",
                    "max_score": "50",
                    "classes": { "subject_id": 12 },
                    "grade_components": { "component_id": 2, "component_name": "Exams", "weight_percentage": "100" }
                },
                { "score": 10, "max_score": 10, "subject_id": 12 }
            ]
        }),
    );
    assert!(approx(num(&v, "percentage"), 90.0));
    assert_eq!(v["droppedEntries"], 1);

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.subject",
        json!({ "studentId": 4, "subjectId": 12, "entries": [], "scaleId": "builtin:fine" }),
    );
    assert!(approx(num(&empty, "percentage"), 0.0));
    assert_eq!(empty["components"], json!([]));
    assert_eq!(empty["gpaString"], "N/A");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "grades.subject",
        json!({ "subjectId": 12, "entries": [] }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn gwa_and_class_summary() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let gwa = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.gwa",
        json!({
            "scaleId": "builtin:fine",
            "subjects": [
                { "percentage": 90, "units": 3 },
                { "percentage": 80, "units": 1 },
                { "percentage": 70 }
            ]
        }),
    );
    // (270 + 80 + 70) / 5
    assert!(approx(num(&gwa, "gwa"), 84.0));
    assert!(approx(num(&gwa, "totalUnits"), 5.0));
    assert!(approx(num(&gwa, "gpa"), 2.25));
    // (1.75 * 3 + 2.5 + 3.5) / 5
    assert!(approx(num(&gwa, "gradePointAverage"), 2.25));

    let bare = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.gwa",
        json!({ "subjects": [{ "percentage": 88 }] }),
    );
    assert!(approx(num(&bare, "gwa"), 88.0));
    assert!(bare["scaleId"].is_null());
    assert!(bare.get("gpa").is_none());

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.classSummary",
        json!({
            "subjectId": 10,
            "components": [{ "component_id": 1, "component_name": "Quizzes", "weight_percentage": 100 }],
            "entries": [
                { "student_id": 1, "subject_id": 10, "component_id": 1, "score": 8, "max_score": 10, "date_recorded": "2024-09-01" },
                { "student_id": 1, "subject_id": 10, "component_id": 1, "score": 6, "max_score": 10, "date_recorded": "2024-09-08" },
                { "student_id": 2, "subject_id": 10, "component_id": 1, "score": 9, "max_score": 10, "date_recorded": "2024-09-01" },
                { "student_id": 3, "subject_id": 10, "component_id": 1, "score": null, "max_score": 10, "date_recorded": "2024-09-01" },
                { "student_id": 1, "subject_id": 11, "component_id": 1, "score": 1, "max_score": 10 }
            ]
        }),
    );
    let subjects = summary["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 1);
    let s = &subjects[0];
    assert_eq!(s["subjectId"], 10);
    assert_eq!(s["assignmentCount"], 2);
    // Student 3 has nothing graded and stays out of the class average.
    assert!(approx(num(s, "classAverage"), 80.0));
    let students = s["students"].as_array().expect("students");
    assert_eq!(students.len(), 3);
    assert!(approx(num(&students[0], "percentage"), 70.0));
    assert!(approx(num(&students[0], "simpleAverage"), 70.0));
    assert_eq!(students[2]["gradedComponents"], 0);

    drop(stdin);
    let _ = child.wait();
}
