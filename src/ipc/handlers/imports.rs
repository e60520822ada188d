use super::setup::load_import_settings;
use crate::db::{self, ImportRun};
use crate::import::{ActivityImportRunner, ImportOptions, ImportRunner, Jurisdiction};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_bool, get_optional_str, get_string_list, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::logging::TimedOperation;
use crate::source::{CsvFileSource, JsonRowsSource, RowSource, SourceBatch};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::{json, Value};

const RUNS_DEFAULT_LIMIT: usize = 20;
const RUNS_MAX_LIMIT: usize = 200;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Feed {
    Jobs,
    Activity,
}

impl Feed {
    fn as_str(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Activity => "activity",
        }
    }
}

/// Rows come either from a CSV file (`inPath`) or inline (`rows`).
fn load_batch(params: &Value) -> Result<SourceBatch, HandlerErr> {
    let loaded = if let Some(path) = get_optional_str(params, "inPath") {
        CsvFileSource::new(&path)
            .load()
            .map_err(|e| (e, json!({ "path": path })))
    } else if let Some(rows) = params.get("rows") {
        JsonRowsSource::new("inline", rows.clone())
            .load()
            .map_err(|e| (e, json!({ "source": "rows" })))
    } else {
        return Err(HandlerErr::bad_params("missing inPath or rows"));
    };
    loaded.map_err(|(e, details)| {
        HandlerErr::new("parse_failed", e.to_string()).with_details(details)
    })
}

fn import_options(
    conn: &Connection,
    params: &Value,
    force_dry_run: bool,
) -> Result<ImportOptions, HandlerErr> {
    let settings = load_import_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    let dry_run = force_dry_run
        || get_optional_bool(params, "dryRun")?.unwrap_or(settings.default_dry_run);
    let include_entities =
        get_optional_bool(params, "includeEntities")?.unwrap_or(settings.include_entities);
    let states = get_string_list(params, "allowedStates")?.unwrap_or(settings.allowed_states);
    let counties =
        get_string_list(params, "allowedCounties")?.unwrap_or(settings.allowed_counties);

    Ok(ImportOptions {
        dry_run,
        owner_id: get_optional_str(params, "ownerId"),
        include_entities,
        jurisdiction: Jurisdiction::new(&states, &counties),
        ..Default::default()
    })
}

fn with_source(mut out: Value, batch: &SourceBatch, run_id: Option<&str>) -> Value {
    out["source"] = json!({
        "label": batch.label,
        "sha256": batch.sha256,
        "rows": batch.rows.len(),
    });
    if let Some(id) = run_id {
        out["runId"] = json!(id);
    }
    out
}

/// Runs one feed inside a transaction. A live run is committed and recorded in
/// `import_runs`; a dry run's transaction is dropped.
fn run_feed(
    conn: &Connection,
    params: &Value,
    feed: Feed,
    preview: bool,
) -> Result<Value, HandlerErr> {
    let options = import_options(conn, params, preview)?;
    let batch = load_batch(params)?;
    let timer = TimedOperation::new(&format!("{} import", feed.as_str()));
    let dry_run = options.dry_run;
    let owner_id = options.owner_id.clone();
    let started_at = options.run_at.clone();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let summary = {
        let mut store = SqliteStore::new(&tx);
        let result = match feed {
            Feed::Jobs => ImportRunner::new(&mut store, options)
                .run(&batch.rows)
                .and_then(|s| Ok(serde_json::to_value(s)?)),
            Feed::Activity => ActivityImportRunner::new(&mut store, options)
                .run(&batch.rows)
                .and_then(|s| Ok(serde_json::to_value(s)?)),
        };
        result.map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?
    };

    if dry_run {
        timer.finish_with_info("dry run");
        return Ok(with_source(summary, &batch, None));
    }

    let run = ImportRun {
        id: uuid::Uuid::new_v4().to_string(),
        feed: feed.as_str().to_string(),
        source_label: batch.label.clone(),
        source_sha256: batch.sha256.clone(),
        owner_id,
        started_at,
        summary: summary.clone(),
    };
    db::insert_import_run(&tx, &run)
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    timer.finish_with_info(&format!("{} rows", batch.rows.len()));
    Ok(with_source(summary, &batch, Some(&run.id)))
}

fn handle_import(state: &mut AppState, req: &Request, feed: Feed, preview: bool) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match run_feed(conn, &req.params, feed, preview) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_runs_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let limit = match req.params.get("limit") {
        None | Some(Value::Null) => RUNS_DEFAULT_LIMIT,
        Some(v) => match v.as_u64() {
            Some(n) if (1..=RUNS_MAX_LIMIT as u64).contains(&n) => n as usize,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("limit must be in 1..={}", RUNS_MAX_LIMIT),
                    None,
                )
            }
        },
    };
    match db::list_import_runs(conn, limit) {
        Ok(runs) => ok(&req.id, json!({ "runs": runs })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "imports.jobs.preview" => Some(handle_import(state, req, Feed::Jobs, true)),
        "imports.jobs.apply" => Some(handle_import(state, req, Feed::Jobs, false)),
        "imports.activity.preview" => Some(handle_import(state, req, Feed::Activity, true)),
        "imports.activity.apply" => Some(handle_import(state, req, Feed::Activity, false)),
        "imports.runs.list" => Some(handle_runs_list(state, req)),
        _ => None,
    }
}
