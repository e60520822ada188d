use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::keys;
use crate::model::{fields, Category, FieldPatch, FieldValue, Job, JobStatus, Record};
use crate::normalize::{parse_date, parse_money};
use crate::source::Cell;
use crate::store::{RecordStore, SqliteStore};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

fn job_json(job: &Job) -> Value {
    serde_json::to_value(job).unwrap_or(Value::Null)
}

/// A user-supplied value for one editable job field.
fn parse_field_value(field: &'static str, v: &Value) -> Result<FieldValue, HandlerErr> {
    if v.is_null() {
        if field == fields::NAME || field == fields::CATEGORY || field == fields::STATUS {
            return Err(HandlerErr::bad_params(format!("{} cannot be cleared", field)));
        }
        return Ok(FieldValue::Null);
    }
    let bad = || HandlerErr::bad_params(format!("invalid value for {}", field));
    match field {
        fields::PROJECT_VALUE => parse_money(Some(&Cell::from_json(v)))
            .map(FieldValue::Number)
            .ok_or_else(bad),
        fields::START_DATE | fields::END_DATE => parse_date(Some(&Cell::from_json(v)))
            .map(FieldValue::Date)
            .ok_or_else(bad),
        fields::CATEGORY => v
            .as_str()
            .and_then(Category::parse)
            .map(|c| FieldValue::text(c.as_str()))
            .ok_or_else(bad),
        fields::STATUS => v
            .as_str()
            .and_then(JobStatus::parse)
            .map(|s| FieldValue::text(s.as_str()))
            .ok_or_else(bad),
        _ => v.as_str().map(FieldValue::text).ok_or_else(bad),
    }
}

fn parse_field_patch(obj: &Map<String, Value>) -> Result<FieldPatch, HandlerErr> {
    let mut patch = FieldPatch::new();
    for (k, v) in obj {
        let Some(field) = fields::job_field(k) else {
            return Err(HandlerErr::bad_params(format!("unknown job field: {}", k)));
        };
        patch.set(field, parse_field_value(field, v)?);
    }
    Ok(patch)
}

fn parse_field_names(params: &Value) -> Result<Vec<&'static str>, HandlerErr> {
    let Some(items) = params.get("fields").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("fields must be an array"));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .and_then(fields::job_field)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown job field: {}", v)))
        })
        .collect()
}

fn load_job(conn: &Connection, job_id: &str) -> Result<Job, HandlerErr> {
    match SqliteStore::new(conn).get_job(job_id) {
        Ok(Some(job)) => Ok(job),
        Ok(None) => Err(HandlerErr::new("not_found", "job not found")
            .with_details(json!({ "jobId": job_id }))),
        Err(e) => Err(HandlerErr::new("db_query_failed", format!("{e:#}"))),
    }
}

fn handle_jobs_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = get_optional_str(&req.params, "ownerId");
    let store = SqliteStore::new(conn);
    match RecordStore::<Job>::list_owned(&store, owner_id.as_deref()) {
        Ok(jobs) => ok(
            &req.id,
            json!({ "jobs": jobs.iter().map(job_json).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_jobs_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match load_job(conn, &job_id) {
        Ok(job) => ok(&req.id, json!({ "job": job_json(&job) })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_jobs_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(input) = req.params.get("job").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "job must be an object", None);
    };
    let mut content = input.clone();
    let external_id = content
        .remove(fields::EXTERNAL_ID)
        .and_then(|v| keys::external_id(Some(&Cell::from_json(&v))));
    let patch = match parse_field_patch(&content) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let Some(name) = patch.get(fields::NAME).and_then(FieldValue::as_text) else {
        return err(&req.id, "bad_params", "job.name is required", None);
    };

    // Manual entry does not lock anything; only later edits do.
    let mut job = Job::new(name);
    job.apply(&patch);
    job.owner_id = get_optional_str(&req.params, "ownerId");
    job.external_id = external_id;
    job.dedupe_key = keys::dedupe_key(&job.name, &job.address, &job.county);

    let mut store = SqliteStore::new(conn);
    match store.create(job) {
        Ok(job) => {
            info!("job created manually: {}", job.id);
            ok(&req.id, json!({ "job": job_json(&job) }))
        }
        Err(e) => err(&req.id, "db_update_failed", format!("{e:#}"), None),
    }
}

/// User edit: writes the patch and locks every edited field so later imports
/// leave it alone.
fn handle_jobs_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut patch = match parse_field_patch(patch_obj) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let current = match load_job(conn, &job_id) {
        Ok(job) => job,
        Err(e) => return e.response(&req.id),
    };

    let mut edited = current.clone();
    edited.apply(&patch);
    let dedupe_key = keys::dedupe_key(&edited.name, &edited.address, &edited.county);
    if dedupe_key != current.dedupe_key {
        patch.set(fields::DEDUPE_KEY, FieldValue::Text(dedupe_key));
    }
    let mut locked = current.locked_fields.clone();
    for field in patch_obj.keys() {
        locked.insert(field.clone());
    }

    let tx = match conn.unchecked_transaction() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    {
        let mut store = SqliteStore::new(&tx);
        if let Err(e) = RecordStore::<Job>::update(&mut store, &job_id, &patch) {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
        if let Err(e) = store.set_job_locks(&job_id, &locked) {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match load_job(conn, &job_id) {
        Ok(job) => ok(&req.id, json!({ "job": job_json(&job) })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_jobs_set_locks(state: &mut AppState, req: &Request, lock: bool) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let names = match parse_field_names(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let current = match load_job(conn, &job_id) {
        Ok(job) => job,
        Err(e) => return e.response(&req.id),
    };

    let mut locked: BTreeSet<String> = current.locked_fields().clone();
    for name in names {
        if lock {
            locked.insert(name.to_string());
        } else {
            locked.remove(name);
        }
    }
    if let Err(e) = SqliteStore::new(conn).set_job_locks(&job_id, &locked) {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }
    ok(
        &req.id,
        json!({ "jobId": job_id, "lockedFields": locked }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "jobs.list" => Some(handle_jobs_list(state, req)),
        "jobs.get" => Some(handle_jobs_get(state, req)),
        "jobs.create" => Some(handle_jobs_create(state, req)),
        "jobs.update" => Some(handle_jobs_update(state, req)),
        "jobs.lockFields" => Some(handle_jobs_set_locks(state, req, true)),
        "jobs.unlockFields" => Some(handle_jobs_set_locks(state, req, false)),
        _ => None,
    }
}
