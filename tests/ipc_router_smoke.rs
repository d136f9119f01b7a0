mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("timetable-router-smoke");
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("1", "health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    assert_eq!(sc.request_err("2", "schedules.list", json!({})), "no_workspace");
    sc.open_workspace(workspace.path());
    let school_id = sc.import_approved("timetable/sample.xml", "school-smoke");

    let methods = [
        ("schedules.list", json!({})),
        ("schedules.get", json!({ "schoolId": school_id })),
        ("schedules.teacherTable", json!({ "schoolId": school_id })),
        ("schedules.view", json!({})),
        ("teachers.list", json!({})),
        ("teachers.timetable", json!({ "teacherId": "school-smoke-1" })),
        ("absences.list", json!({})),
        ("absences.purgeUnknown", json!({})),
        (
            "absences.availableSubstitutes",
            json!({ "teacherId": "school-smoke-1", "day": "الأحد", "periods": [1] }),
        ),
        (
            "analytics.suggestSubstitutes",
            json!({ "day": "الأحد", "periodNumber": 1 }),
        ),
        ("analytics.substituteLoad", json!({})),
        ("analytics.dailyLoad", json!({})),
        ("analytics.dashboard", json!({ "date": "2026-10-18" })),
        ("setup.get", json!({})),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let _ = sc.request_ok(&format!("m{}", i), method, params);
    }

    assert_eq!(
        sc.request_err("x", "gradebook.open", json!({})),
        "not_implemented"
    );
}

#[test]
fn malformed_line_gets_bad_json_and_loop_survives() {
    let mut sc = spawn_sidecar();
    let resp = sc.send_line("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");
    let health = sc.request_ok("after", "health", json!({}));
    assert!(health["version"].is_string());
}

#[test]
fn health_and_select_report_workspace_contents() {
    let workspace = temp_dir("timetable-health");
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("1", "health", json!({}));
    assert!(health["workspace"].is_null());

    let opened = sc.request_ok(
        "2",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    assert_eq!(opened["workspace"]["schedules"], 0);
    assert_eq!(opened["workspace"]["absences"], 0);

    sc.import_approved("timetable/sample.xml", "s1");
    sc.request_ok(
        "3",
        "schedules.import",
        json!({ "xml": test_support::read_fixture("timetable/single_slot.xml"), "schoolId": "s2" }),
    );
    let health = sc.request_ok("4", "health", json!({}));
    assert_eq!(health["workspace"]["schedules"], 2);
    assert_eq!(health["workspace"]["approvedSchedules"], 1);

    let file = workspace.path().join("timetabled.sqlite3");
    assert_eq!(
        sc.request_err(
            "5",
            "workspace.select",
            json!({ "path": file.to_string_lossy() })
        ),
        "bad_params"
    );
    assert_eq!(sc.request_err("6", "workspace.select", json!({ "path": " " })), "bad_params");
}
