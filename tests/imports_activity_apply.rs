use serde_json::json;


use test_support::{request_ok, spawn_sidecar, temp_dir};

fn tally(v: &serde_json::Value, kind: &str) -> (u64, u64, u64, u64) {
    let t = &v[kind];
    (
        t["imported"].as_u64().unwrap_or(99),
        t["updated"].as_u64().unwrap_or(99),
        t["unchanged"].as_u64().unwrap_or(99),
        t["skipped"].as_u64().unwrap_or(99),
    )
}

#[test]
fn activity_rows_upsert_companies_contacts_and_interactions() {
    let workspace = temp_dir("jobsyncd-activity");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let rows = json!([
        {
            "Company": "Acme Builders",
            "City": "Fresno",
            "State": "CA",
            "Contact": "Dana Ruiz",
            "Email": "dana@acme.test",
            "Date": "2025-03-04",
            "Type": "Call",
            "Notes": "Intro call about the depot bid"
        },
        {
            "Company": "  Acme Builders ",
            "First Name": "Lee",
            "Last Name": "Park"
        },
        {
            "Contact": "Nobody In Particular"
        }
    ]);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "imports.activity.preview",
        json!({ "rows": rows }),
    );
    assert_eq!(preview["dryRun"].as_bool(), Some(true));
    assert_eq!(preview["rows"].as_u64(), Some(3));
    assert_eq!(preview["skipped"].as_u64(), Some(1));
    assert_eq!(tally(&preview, "companies"), (1, 0, 1, 0));
    assert_eq!(tally(&preview, "contacts"), (2, 0, 0, 0));
    assert_eq!(tally(&preview, "interactions"), (1, 0, 0, 0));

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "imports.activity.apply",
        json!({ "rows": rows }),
    );
    assert_eq!(applied["dryRun"].as_bool(), Some(false));
    assert!(applied["errors"].as_array().is_some_and(|e| e.is_empty()));
    assert_eq!(tally(&applied, "companies"), tally(&preview, "companies"));
    assert_eq!(tally(&applied, "contacts"), tally(&preview, "contacts"));
    assert_eq!(
        tally(&applied, "interactions"),
        tally(&preview, "interactions")
    );

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "imports.activity.apply",
        json!({ "rows": rows }),
    );
    assert_eq!(tally(&again, "companies"), (0, 0, 2, 0));
    assert_eq!(tally(&again, "contacts"), (0, 0, 2, 0));
    assert_eq!(tally(&again, "interactions"), (0, 0, 1, 0));

    let runs = request_ok(&mut stdin, &mut reader, "5", "imports.runs.list", json!({}));
    let runs = runs["runs"].as_array().cloned().unwrap_or_default();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r["feed"].as_str() == Some("activity")));
    assert_eq!(runs[0]["sourceLabel"].as_str(), Some("inline"));
}
