use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub const DB_FILE: &str = "jobsync.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs(
            id TEXT PRIMARY KEY,
            owner_id TEXT,
            external_id TEXT,
            dedupe_key TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            county TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            project_value REAL,
            start_date TEXT,
            end_date TEXT,
            contractor TEXT NOT NULL DEFAULT '',
            owner_name TEXT NOT NULL DEFAULT '',
            architect TEXT NOT NULL DEFAULT '',
            engineer TEXT NOT NULL DEFAULT '',
            locked_fields TEXT NOT NULL DEFAULT '[]',
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before imports were tracked lack the stamp column.
    ensure_last_imported_at(conn, "jobs")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_external ON jobs(external_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_dedupe ON jobs(dedupe_key)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies(
            id TEXT PRIMARY KEY,
            owner_id TEXT,
            external_id TEXT,
            dedupe_key TEXT NOT NULL,
            name TEXT NOT NULL,
            industry TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            locked_fields TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;
    ensure_last_imported_at(conn, "companies")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_companies_owner ON companies(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contacts(
            id TEXT PRIMARY KEY,
            owner_id TEXT,
            company_id TEXT,
            external_id TEXT,
            dedupe_key TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            locked_fields TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(company_id) REFERENCES companies(id)
        )",
        [],
    )?;
    ensure_last_imported_at(conn, "contacts")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_contacts_company ON contacts(company_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS interactions(
            id TEXT PRIMARY KEY,
            owner_id TEXT,
            company_id TEXT,
            contact_id TEXT,
            dedupe_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            occurred_on TEXT,
            notes TEXT NOT NULL DEFAULT '',
            locked_fields TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(company_id) REFERENCES companies(id),
            FOREIGN KEY(contact_id) REFERENCES contacts(id)
        )",
        [],
    )?;
    ensure_last_imported_at(conn, "interactions")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_interactions_company ON interactions(company_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            feed TEXT NOT NULL,
            source_label TEXT NOT NULL,
            source_sha256 TEXT NOT NULL,
            owner_id TEXT,
            started_at TEXT NOT NULL,
            summary_json TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_runs_started ON import_runs(started_at)",
        [],
    )?;

    Ok(())
}

fn ensure_last_imported_at(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "last_imported_at")? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN last_imported_at TEXT", table),
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
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

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// One recorded live import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: String,
    pub feed: String,
    pub source_label: String,
    pub source_sha256: String,
    pub owner_id: Option<String>,
    pub started_at: String,
    pub summary: Value,
}

pub fn insert_import_run(conn: &Connection, run: &ImportRun) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO import_runs(id, feed, source_label, source_sha256, owner_id, started_at, summary_json)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &run.id,
            &run.feed,
            &run.source_label,
            &run.source_sha256,
            &run.owner_id,
            &run.started_at,
            serde_json::to_string(&run.summary)?,
        ),
    )?;
    Ok(())
}

pub fn list_import_runs(conn: &Connection, limit: usize) -> anyhow::Result<Vec<ImportRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, feed, source_label, source_sha256, owner_id, started_at, summary_json
         FROM import_runs
         ORDER BY started_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit as i64], |r| {
            Ok((
                ImportRun {
                    id: r.get(0)?,
                    feed: r.get(1)?,
                    source_label: r.get(2)?,
                    source_sha256: r.get(3)?,
                    owner_id: r.get(4)?,
                    started_at: r.get(5)?,
                    summary: Value::Null,
                },
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (mut run, summary_json) in rows {
        run.summary = serde_json::from_str(&summary_json)?;
        out.push(run);
    }
    Ok(out)
}
