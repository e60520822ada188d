use serde_json::json;


use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir, write_csv};

#[test]
fn unreadable_sources_are_parse_failures() {
    let workspace = temp_dir("jobsyncd-parse-fail");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let missing = workspace.join("does-not-exist.csv");
    let value = request(
        &mut stdin,
        &mut reader,
        "2",
        "imports.jobs.preview",
        json!({ "inPath": missing.to_string_lossy() }),
    );
    assert_eq!(value["ok"].as_bool(), Some(false));
    assert_eq!(value["error"]["code"].as_str(), Some("parse_failed"));
    assert_eq!(
        value["error"]["details"]["path"].as_str(),
        Some(missing.to_string_lossy().as_ref())
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "imports.activity.apply",
        json!({ "rows": { "Company": "Acme" } }),
    );
    assert_eq!(code, "parse_failed");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "imports.jobs.apply",
        json!({ "rows": ["just a string"] }),
    );
    assert_eq!(code, "parse_failed");

    let code = request_err(&mut stdin, &mut reader, "5", "imports.jobs.apply", json!({}));
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "imports.jobs.apply",
        json!({ "rows": [], "dryRun": "no" }),
    );
    assert_eq!(code, "bad_params");

    let runs = request_ok(&mut stdin, &mut reader, "7", "imports.runs.list", json!({}));
    assert_eq!(runs["runs"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn header_only_file_imports_nothing() {
    let workspace = temp_dir("jobsyncd-header-only");
    let csv = write_csv(&workspace, "empty.csv", "Project Name,City,State\n");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "imports.jobs.preview",
        json!({ "inPath": csv.to_string_lossy() }),
    );
    assert_eq!(summary["imported"].as_u64(), Some(0));
    assert_eq!(summary["source"]["rows"].as_u64(), Some(0));
}

#[test]
fn imports_need_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "imports.jobs.preview",
        json!({ "rows": [] }),
    );
    assert_eq!(code, "no_workspace");
}
