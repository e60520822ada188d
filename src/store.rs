use crate::model::{
    fields, Category, Company, Contact, FieldPatch, Interaction, InteractionKind, Job, JobStatus,
    Record,
};
use anyhow::Context;
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

/// Persistence seam for the import engine. Ownership scoping is opaque: the
/// store decides what "owned by" means.
pub trait RecordStore<R: Record> {
    /// All records for `owner_id`, or every record when no scope is given.
    fn list_owned(&self, owner_id: Option<&str>) -> anyhow::Result<Vec<R>>;
    /// Persist a new record; the returned copy carries its assigned id.
    fn create(&mut self, record: R) -> anyhow::Result<R>;
    /// Write the patched fields of one record in a single statement.
    fn update(&mut self, id: &str, patch: &FieldPatch) -> anyhow::Result<()>;
}

/// Row mapping for a record kind kept in its own table.
pub trait SqlRecord: Record + Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    const HAS_UPDATED_AT: bool = false;

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self>;
    fn insert(&self, conn: &Connection) -> anyhow::Result<()>;
    fn column(field: &str) -> Option<&'static str>;
    fn on_create(&mut self, _now: &str) {}
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get<R: SqlRecord>(&self, id: &str) -> anyhow::Result<Option<R>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", R::COLUMNS, R::TABLE);
        let found = self
            .conn
            .query_row(&sql, [id], |r| R::from_row(r))
            .optional()
            .with_context(|| format!("load {} {}", R::TABLE, id))?;
        Ok(found)
    }

    pub fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>> {
        self.get::<Job>(id)
    }

    /// Replace a job's lock set. Only user-edit paths call this.
    pub fn set_job_locks(&self, id: &str, locked: &BTreeSet<String>) -> anyhow::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET locked_fields = ?, updated_at = ? WHERE id = ?",
            (locks_to_json(locked)?, now_stamp(), id),
        )?;
        Ok(changed > 0)
    }
}

impl<R: SqlRecord> RecordStore<R> for SqliteStore<'_> {
    fn list_owned(&self, owner_id: Option<&str>) -> anyhow::Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY rowid",
            R::COLUMNS,
            R::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([owner_id], |r| R::from_row(r))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("list {}", R::TABLE))?;
        Ok(rows)
    }

    fn create(&mut self, mut record: R) -> anyhow::Result<R> {
        if record.id().is_empty() {
            record.set_id(uuid::Uuid::new_v4().to_string());
        }
        record.on_create(&now_stamp());
        record
            .insert(self.conn)
            .with_context(|| format!("insert into {}", R::TABLE))?;
        Ok(record)
    }

    fn update(&mut self, id: &str, patch: &FieldPatch) -> anyhow::Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let now = now_stamp();
        let mut sets = Vec::with_capacity(patch.len() + 1);
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(patch.len() + 2);
        for (field, value) in patch.iter() {
            let Some(column) = R::column(field) else {
                anyhow::bail!("{} has no field {}", R::TABLE, field);
            };
            sets.push(format!("{} = ?", column));
            params.push(value);
        }
        if R::HAS_UPDATED_AT {
            sets.push("updated_at = ?".to_string());
            params.push(&now);
        }
        params.push(&id);

        let sql = format!("UPDATE {} SET {} WHERE id = ?", R::TABLE, sets.join(", "));
        let changed = self
            .conn
            .execute(&sql, params.as_slice())
            .with_context(|| format!("update {} {}", R::TABLE, id))?;
        if changed == 0 {
            anyhow::bail!("{} {} not found", R::TABLE, id);
        }
        Ok(())
    }
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn locks_to_json(locked: &BTreeSet<String>) -> anyhow::Result<String> {
    Ok(serde_json::to_string(locked)?)
}

fn locks_from_row(r: &Row<'_>, idx: usize) -> rusqlite::Result<BTreeSet<String>> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn text_or_empty(r: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(r.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

impl SqlRecord for Job {
    const TABLE: &'static str = "jobs";
    const COLUMNS: &'static str = "id, owner_id, external_id, dedupe_key, name, description, \
        address, county, category, status, project_value, start_date, end_date, contractor, \
        owner_name, architect, engineer, locked_fields, last_imported_at, created_at, updated_at";
    const HAS_UPDATED_AT: bool = true;

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let category: String = r.get(8)?;
        let status: String = r.get(9)?;
        Ok(Job {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            external_id: r.get(2)?,
            dedupe_key: r.get(3)?,
            name: r.get(4)?,
            description: text_or_empty(r, 5)?,
            address: text_or_empty(r, 6)?,
            county: text_or_empty(r, 7)?,
            category: Category::parse(&category).unwrap_or(Category::DEFAULT),
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Planning),
            project_value: r.get(10)?,
            start_date: r.get(11)?,
            end_date: r.get(12)?,
            contractor: text_or_empty(r, 13)?,
            owner_name: text_or_empty(r, 14)?,
            architect: text_or_empty(r, 15)?,
            engineer: text_or_empty(r, 16)?,
            locked_fields: locks_from_row(r, 17)?,
            last_imported_at: r.get(18)?,
            created_at: r.get(19)?,
            updated_at: r.get(20)?,
        })
    }

    fn insert(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO jobs(id, owner_id, external_id, dedupe_key, name, description, address,
                county, category, status, project_value, start_date, end_date, contractor,
                owner_name, architect, engineer, locked_fields, last_imported_at, created_at,
                updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id,
                self.owner_id,
                self.external_id,
                self.dedupe_key,
                self.name,
                self.description,
                self.address,
                self.county,
                self.category.as_str(),
                self.status.as_str(),
                self.project_value,
                self.start_date,
                self.end_date,
                self.contractor,
                self.owner_name,
                self.architect,
                self.engineer,
                locks_to_json(&self.locked_fields)?,
                self.last_imported_at,
                self.created_at,
                self.updated_at,
            ],
        )?;
        Ok(())
    }

    fn column(field: &str) -> Option<&'static str> {
        Some(match field {
            fields::EXTERNAL_ID => "external_id",
            fields::DEDUPE_KEY => "dedupe_key",
            fields::LAST_IMPORTED_AT => "last_imported_at",
            fields::NAME => "name",
            fields::DESCRIPTION => "description",
            fields::ADDRESS => "address",
            fields::COUNTY => "county",
            fields::CATEGORY => "category",
            fields::STATUS => "status",
            fields::PROJECT_VALUE => "project_value",
            fields::START_DATE => "start_date",
            fields::END_DATE => "end_date",
            fields::CONTRACTOR => "contractor",
            fields::OWNER_NAME => "owner_name",
            fields::ARCHITECT => "architect",
            fields::ENGINEER => "engineer",
            _ => return None,
        })
    }

    fn on_create(&mut self, now: &str) {
        self.created_at = Some(now.to_string());
        self.updated_at = Some(now.to_string());
    }
}

impl SqlRecord for Company {
    const TABLE: &'static str = "companies";
    const COLUMNS: &'static str = "id, owner_id, external_id, dedupe_key, name, industry, \
        phone, website, city, state, locked_fields, last_imported_at";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Company {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            external_id: r.get(2)?,
            dedupe_key: r.get(3)?,
            name: r.get(4)?,
            industry: text_or_empty(r, 5)?,
            phone: text_or_empty(r, 6)?,
            website: text_or_empty(r, 7)?,
            city: text_or_empty(r, 8)?,
            state: text_or_empty(r, 9)?,
            locked_fields: locks_from_row(r, 10)?,
            last_imported_at: r.get(11)?,
        })
    }

    fn insert(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO companies(id, owner_id, external_id, dedupe_key, name, industry, phone,
                website, city, state, locked_fields, last_imported_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id,
                self.owner_id,
                self.external_id,
                self.dedupe_key,
                self.name,
                self.industry,
                self.phone,
                self.website,
                self.city,
                self.state,
                locks_to_json(&self.locked_fields)?,
                self.last_imported_at,
            ],
        )?;
        Ok(())
    }

    fn column(field: &str) -> Option<&'static str> {
        Some(match field {
            fields::EXTERNAL_ID => "external_id",
            fields::DEDUPE_KEY => "dedupe_key",
            fields::LAST_IMPORTED_AT => "last_imported_at",
            fields::NAME => "name",
            fields::INDUSTRY => "industry",
            fields::PHONE => "phone",
            fields::WEBSITE => "website",
            fields::CITY => "city",
            fields::STATE => "state",
            _ => return None,
        })
    }
}

impl SqlRecord for Contact {
    const TABLE: &'static str = "contacts";
    const COLUMNS: &'static str = "id, owner_id, company_id, external_id, dedupe_key, \
        first_name, last_name, email, phone, title, locked_fields, last_imported_at";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Contact {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            company_id: r.get(2)?,
            external_id: r.get(3)?,
            dedupe_key: r.get(4)?,
            first_name: text_or_empty(r, 5)?,
            last_name: text_or_empty(r, 6)?,
            email: text_or_empty(r, 7)?,
            phone: text_or_empty(r, 8)?,
            title: text_or_empty(r, 9)?,
            locked_fields: locks_from_row(r, 10)?,
            last_imported_at: r.get(11)?,
        })
    }

    fn insert(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO contacts(id, owner_id, company_id, external_id, dedupe_key, first_name,
                last_name, email, phone, title, locked_fields, last_imported_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id,
                self.owner_id,
                self.company_id,
                self.external_id,
                self.dedupe_key,
                self.first_name,
                self.last_name,
                self.email,
                self.phone,
                self.title,
                locks_to_json(&self.locked_fields)?,
                self.last_imported_at,
            ],
        )?;
        Ok(())
    }

    fn column(field: &str) -> Option<&'static str> {
        Some(match field {
            fields::EXTERNAL_ID => "external_id",
            fields::DEDUPE_KEY => "dedupe_key",
            fields::LAST_IMPORTED_AT => "last_imported_at",
            fields::COMPANY_ID => "company_id",
            fields::FIRST_NAME => "first_name",
            fields::LAST_NAME => "last_name",
            fields::EMAIL => "email",
            fields::PHONE => "phone",
            fields::TITLE => "title",
            _ => return None,
        })
    }
}

impl SqlRecord for Interaction {
    const TABLE: &'static str = "interactions";
    const COLUMNS: &'static str = "id, owner_id, company_id, contact_id, dedupe_key, kind, \
        occurred_on, notes, locked_fields, last_imported_at";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = r.get(5)?;
        Ok(Interaction {
            id: r.get(0)?,
            owner_id: r.get(1)?,
            company_id: r.get(2)?,
            contact_id: r.get(3)?,
            dedupe_key: r.get(4)?,
            kind: InteractionKind::parse(&kind).unwrap_or(InteractionKind::Note),
            occurred_on: r.get(6)?,
            notes: text_or_empty(r, 7)?,
            locked_fields: locks_from_row(r, 8)?,
            last_imported_at: r.get(9)?,
        })
    }

    fn insert(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO interactions(id, owner_id, company_id, contact_id, dedupe_key, kind,
                occurred_on, notes, locked_fields, last_imported_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id,
                self.owner_id,
                self.company_id,
                self.contact_id,
                self.dedupe_key,
                self.kind.as_str(),
                self.occurred_on,
                self.notes,
                locks_to_json(&self.locked_fields)?,
                self.last_imported_at,
            ],
        )?;
        Ok(())
    }

    fn column(field: &str) -> Option<&'static str> {
        Some(match field {
            fields::DEDUPE_KEY => "dedupe_key",
            fields::LAST_IMPORTED_AT => "last_imported_at",
            fields::NOTES => "notes",
            _ => return None,
        })
    }
}
