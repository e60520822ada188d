use serde_json::json;


use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn edited_fields_survive_import_until_unlocked() {
    let workspace = temp_dir("jobsyncd-locks");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "jobs.create",
        json!({
            "job": {
                "name": "Harbor Bridge Retrofit",
                "address": "1 Pier Rd",
                "contractor": "Bayline Builders"
            }
        }),
    );
    let job_id = created["job"]["id"].as_str().unwrap_or_default().to_string();
    assert!(!job_id.is_empty());
    assert_eq!(created["job"]["lockedFields"], json!([]));
    assert_eq!(created["job"]["status"].as_str(), Some("planning"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.update",
        json!({ "jobId": job_id, "patch": { "contractor": "Kessler & Sons" } }),
    );
    assert_eq!(
        updated["job"]["contractor"].as_str(),
        Some("Kessler & Sons")
    );
    assert_eq!(updated["job"]["lockedFields"], json!(["contractor"]));

    let rows = json!([{
        "Project Name": "Harbor Bridge Retrofit",
        "Address": "1 Pier Rd",
        "General Contractor": "Feed Contractor LLC"
    }]);
    let blocked = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "imports.jobs.apply",
        json!({ "rows": rows }),
    );
    assert_eq!(blocked["skipped"].as_u64(), Some(1));
    assert_eq!(blocked["updated"].as_u64(), Some(0));
    assert_eq!(
        blocked
            .pointer("/entities/skipped/0/reason")
            .and_then(|v| v.as_str()),
        Some("locked")
    );

    let job = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "jobs.get",
        json!({ "jobId": job_id }),
    );
    assert_eq!(job["job"]["contractor"].as_str(), Some("Kessler & Sons"));

    let unlocked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "jobs.unlockFields",
        json!({ "jobId": job_id, "fields": ["contractor"] }),
    );
    assert_eq!(unlocked["lockedFields"], json!([]));

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "imports.jobs.apply",
        json!({ "rows": rows }),
    );
    assert_eq!(applied["updated"].as_u64(), Some(1));
    let job = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "jobs.get",
        json!({ "jobId": job_id }),
    );
    assert_eq!(
        job["job"]["contractor"].as_str(),
        Some("Feed Contractor LLC")
    );
}

#[test]
fn lock_fields_validates_names() {
    let workspace = temp_dir("jobsyncd-lock-names");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "jobs.create",
        json!({ "job": { "name": "Mesa Clinic" } }),
    );
    let job_id = created["job"]["id"].as_str().unwrap_or_default().to_string();

    let locked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.lockFields",
        json!({ "jobId": job_id, "fields": ["status", "projectValue"] }),
    );
    assert_eq!(locked["lockedFields"], json!(["projectValue", "status"]));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "jobs.lockFields",
        json!({ "jobId": job_id, "fields": ["favouriteColour"] }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "jobs.update",
        json!({ "jobId": job_id, "patch": { "name": null } }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "jobs.lockFields",
        json!({ "jobId": "missing", "fields": ["name"] }),
    );
    assert_eq!(code, "not_found");
}
