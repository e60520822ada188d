use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Field names as they appear in patches, `lockedFields` and the IPC payloads.
pub mod fields {
    pub const EXTERNAL_ID: &str = "externalId";
    pub const DEDUPE_KEY: &str = "dedupeKey";
    pub const LAST_IMPORTED_AT: &str = "lastImportedAt";

    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const ADDRESS: &str = "address";
    pub const COUNTY: &str = "county";
    pub const CATEGORY: &str = "category";
    pub const STATUS: &str = "status";
    pub const PROJECT_VALUE: &str = "projectValue";
    pub const START_DATE: &str = "startDate";
    pub const END_DATE: &str = "endDate";
    pub const CONTRACTOR: &str = "contractor";
    pub const OWNER_NAME: &str = "ownerName";
    pub const ARCHITECT: &str = "architect";
    pub const ENGINEER: &str = "engineer";

    pub const INDUSTRY: &str = "industry";
    pub const PHONE: &str = "phone";
    pub const WEBSITE: &str = "website";
    pub const CITY: &str = "city";
    pub const STATE: &str = "state";

    pub const COMPANY_ID: &str = "companyId";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const EMAIL: &str = "email";
    pub const TITLE: &str = "title";

    pub const KIND: &str = "kind";
    pub const OCCURRED_ON: &str = "occurredOn";
    pub const NOTES: &str = "notes";

    /// Job content fields a user may lock against future imports.
    pub const JOB_LOCKABLE: &[&str] = &[
        NAME,
        DESCRIPTION,
        ADDRESS,
        COUNTY,
        CATEGORY,
        STATUS,
        PROJECT_VALUE,
        START_DATE,
        END_DATE,
        CONTRACTOR,
        OWNER_NAME,
        ARCHITECT,
        ENGINEER,
    ];

    pub fn job_field(name: &str) -> Option<&'static str> {
        JOB_LOCKABLE.iter().copied().find(|f| *f == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Commercial,
    Residential,
    Industrial,
    Infrastructure,
}

impl Category {
    pub const DEFAULT: Category = Category::Commercial;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commercial => "commercial",
            Self::Residential => "residential",
            Self::Industrial => "industrial",
            Self::Infrastructure => "infrastructure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commercial" => Some(Self::Commercial),
            "residential" => Some(Self::Residential),
            "industrial" => Some(Self::Industrial),
            "infrastructure" => Some(Self::Infrastructure),
            _ => None,
        }
    }
}

/// Lifecycle status. `Pending` only ever arrives from a feed; inference never
/// produces it on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Planning,
    Active,
    Completed,
    Pending,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Call,
    Email,
    Meeting,
    SiteVisit,
    Note,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::SiteVisit => "site_visit",
            Self::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" => Some(Self::Call),
            "email" => Some(Self::Email),
            "meeting" => Some(Self::Meeting),
            "site_visit" => Some(Self::SiteVisit),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// A single comparable field value. Empty text is represented as `Null` so
/// that "blank in the feed" and "blank in the store" compare equal.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            // Money is stored as REAL; cent-level noise is not a change.
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < 0.005,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl FieldValue {
    pub fn text(s: &str) -> Self {
        let t = s.trim();
        if t.is_empty() {
            Self::Null
        } else {
            Self::Text(t.to_string())
        }
    }

    pub fn opt_text(s: Option<&str>) -> Self {
        s.map(Self::text).unwrap_or(Self::Null)
    }

    pub fn opt_number(n: Option<f64>) -> Self {
        n.map(Self::Number).unwrap_or(Self::Null)
    }

    pub fn opt_date(d: Option<NaiveDate>) -> Self {
        d.map(Self::Date).unwrap_or(Self::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            Self::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            Self::Number(n) => Ok(ToSqlOutput::from(*n)),
            Self::Date(d) => Ok(ToSqlOutput::from(d.format("%Y-%m-%d").to_string())),
        }
    }
}

/// Ordered set of field writes destined for one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    values: BTreeMap<&'static str, FieldValue>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &'static str, value: FieldValue) {
        self.values.insert(field, value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.values.keys().copied().collect()
    }
}

/// Common shape of every reconciled record kind.
pub trait Record: Clone {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn external_id(&self) -> Option<&str>;
    fn dedupe_key(&self) -> &str;
    fn locked_fields(&self) -> &BTreeSet<String>;
    fn field(&self, name: &str) -> FieldValue;

    fn is_locked(&self, field: &str) -> bool {
        self.locked_fields().contains(field)
    }

    fn apply(&mut self, patch: &FieldPatch);
}

fn text_of(v: &FieldValue) -> String {
    v.as_text().unwrap_or_default().to_string()
}

fn opt_text_of(v: &FieldValue) -> Option<String> {
    v.as_text().map(|s| s.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: Option<String>,
    pub external_id: Option<String>,
    pub dedupe_key: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub county: String,
    pub category: Category,
    pub status: JobStatus,
    pub project_value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contractor: String,
    pub owner_name: String,
    pub architect: String,
    pub engineer: String,
    pub locked_fields: BTreeSet<String>,
    pub last_imported_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Job {
    pub fn new(name: &str) -> Self {
        Self {
            id: String::new(),
            owner_id: None,
            external_id: None,
            dedupe_key: String::new(),
            name: name.trim().to_string(),
            description: String::new(),
            address: String::new(),
            county: String::new(),
            category: Category::DEFAULT,
            status: JobStatus::Planning,
            project_value: None,
            start_date: None,
            end_date: None,
            contractor: String::new(),
            owner_name: String::new(),
            architect: String::new(),
            engineer: String::new(),
            locked_fields: BTreeSet::new(),
            last_imported_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Record for Job {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    fn locked_fields(&self) -> &BTreeSet<String> {
        &self.locked_fields
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            fields::EXTERNAL_ID => FieldValue::opt_text(self.external_id.as_deref()),
            fields::DEDUPE_KEY => FieldValue::text(&self.dedupe_key),
            fields::LAST_IMPORTED_AT => FieldValue::opt_text(self.last_imported_at.as_deref()),
            fields::NAME => FieldValue::text(&self.name),
            fields::DESCRIPTION => FieldValue::text(&self.description),
            fields::ADDRESS => FieldValue::text(&self.address),
            fields::COUNTY => FieldValue::text(&self.county),
            fields::CATEGORY => FieldValue::text(self.category.as_str()),
            fields::STATUS => FieldValue::text(self.status.as_str()),
            fields::PROJECT_VALUE => FieldValue::opt_number(self.project_value),
            fields::START_DATE => FieldValue::opt_date(self.start_date),
            fields::END_DATE => FieldValue::opt_date(self.end_date),
            fields::CONTRACTOR => FieldValue::text(&self.contractor),
            fields::OWNER_NAME => FieldValue::text(&self.owner_name),
            fields::ARCHITECT => FieldValue::text(&self.architect),
            fields::ENGINEER => FieldValue::text(&self.engineer),
            _ => FieldValue::Null,
        }
    }

    fn apply(&mut self, patch: &FieldPatch) {
        for (field, v) in patch.iter() {
            match field {
                fields::EXTERNAL_ID => self.external_id = opt_text_of(v),
                fields::DEDUPE_KEY => self.dedupe_key = text_of(v),
                fields::LAST_IMPORTED_AT => self.last_imported_at = opt_text_of(v),
                fields::NAME => self.name = text_of(v),
                fields::DESCRIPTION => self.description = text_of(v),
                fields::ADDRESS => self.address = text_of(v),
                fields::COUNTY => self.county = text_of(v),
                fields::CATEGORY => {
                    if let Some(c) = v.as_text().and_then(Category::parse) {
                        self.category = c;
                    }
                }
                fields::STATUS => {
                    if let Some(s) = v.as_text().and_then(JobStatus::parse) {
                        self.status = s;
                    }
                }
                fields::PROJECT_VALUE => self.project_value = v.as_number(),
                fields::START_DATE => self.start_date = v.as_date(),
                fields::END_DATE => self.end_date = v.as_date(),
                fields::CONTRACTOR => self.contractor = text_of(v),
                fields::OWNER_NAME => self.owner_name = text_of(v),
                fields::ARCHITECT => self.architect = text_of(v),
                fields::ENGINEER => self.engineer = text_of(v),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub owner_id: Option<String>,
    pub external_id: Option<String>,
    pub dedupe_key: String,
    pub name: String,
    pub industry: String,
    pub phone: String,
    pub website: String,
    pub city: String,
    pub state: String,
    pub locked_fields: BTreeSet<String>,
    pub last_imported_at: Option<String>,
}

impl Record for Company {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    fn locked_fields(&self) -> &BTreeSet<String> {
        &self.locked_fields
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            fields::EXTERNAL_ID => FieldValue::opt_text(self.external_id.as_deref()),
            fields::DEDUPE_KEY => FieldValue::text(&self.dedupe_key),
            fields::NAME => FieldValue::text(&self.name),
            fields::INDUSTRY => FieldValue::text(&self.industry),
            fields::PHONE => FieldValue::text(&self.phone),
            fields::WEBSITE => FieldValue::text(&self.website),
            fields::CITY => FieldValue::text(&self.city),
            fields::STATE => FieldValue::text(&self.state),
            _ => FieldValue::Null,
        }
    }

    fn apply(&mut self, patch: &FieldPatch) {
        for (field, v) in patch.iter() {
            match field {
                fields::EXTERNAL_ID => self.external_id = opt_text_of(v),
                fields::DEDUPE_KEY => self.dedupe_key = text_of(v),
                fields::LAST_IMPORTED_AT => self.last_imported_at = opt_text_of(v),
                fields::NAME => self.name = text_of(v),
                fields::INDUSTRY => self.industry = text_of(v),
                fields::PHONE => self.phone = text_of(v),
                fields::WEBSITE => self.website = text_of(v),
                fields::CITY => self.city = text_of(v),
                fields::STATE => self.state = text_of(v),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub owner_id: Option<String>,
    pub company_id: Option<String>,
    pub external_id: Option<String>,
    pub dedupe_key: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub locked_fields: BTreeSet<String>,
    pub last_imported_at: Option<String>,
}

impl Record for Contact {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    fn locked_fields(&self) -> &BTreeSet<String> {
        &self.locked_fields
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            fields::EXTERNAL_ID => FieldValue::opt_text(self.external_id.as_deref()),
            fields::DEDUPE_KEY => FieldValue::text(&self.dedupe_key),
            fields::COMPANY_ID => FieldValue::opt_text(self.company_id.as_deref()),
            fields::FIRST_NAME => FieldValue::text(&self.first_name),
            fields::LAST_NAME => FieldValue::text(&self.last_name),
            fields::EMAIL => FieldValue::text(&self.email),
            fields::PHONE => FieldValue::text(&self.phone),
            fields::TITLE => FieldValue::text(&self.title),
            _ => FieldValue::Null,
        }
    }

    fn apply(&mut self, patch: &FieldPatch) {
        for (field, v) in patch.iter() {
            match field {
                fields::EXTERNAL_ID => self.external_id = opt_text_of(v),
                fields::DEDUPE_KEY => self.dedupe_key = text_of(v),
                fields::LAST_IMPORTED_AT => self.last_imported_at = opt_text_of(v),
                fields::COMPANY_ID => self.company_id = opt_text_of(v),
                fields::FIRST_NAME => self.first_name = text_of(v),
                fields::LAST_NAME => self.last_name = text_of(v),
                fields::EMAIL => self.email = text_of(v),
                fields::PHONE => self.phone = text_of(v),
                fields::TITLE => self.title = text_of(v),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    pub owner_id: Option<String>,
    pub company_id: Option<String>,
    pub contact_id: Option<String>,
    pub dedupe_key: String,
    pub kind: InteractionKind,
    pub occurred_on: Option<NaiveDate>,
    pub notes: String,
    pub locked_fields: BTreeSet<String>,
    pub last_imported_at: Option<String>,
}

impl Record for Interaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    // Activity feeds carry no identifier for individual interactions.
    fn external_id(&self) -> Option<&str> {
        None
    }

    fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    fn locked_fields(&self) -> &BTreeSet<String> {
        &self.locked_fields
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            fields::DEDUPE_KEY => FieldValue::text(&self.dedupe_key),
            fields::KIND => FieldValue::text(self.kind.as_str()),
            fields::OCCURRED_ON => FieldValue::opt_date(self.occurred_on),
            fields::NOTES => FieldValue::text(&self.notes),
            _ => FieldValue::Null,
        }
    }

    fn apply(&mut self, patch: &FieldPatch) {
        for (field, v) in patch.iter() {
            match field {
                fields::DEDUPE_KEY => self.dedupe_key = text_of(v),
                fields::LAST_IMPORTED_AT => self.last_imported_at = opt_text_of(v),
                fields::NOTES => self.notes = text_of(v),
                _ => {}
            }
        }
    }
}
