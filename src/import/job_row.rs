use crate::columns::job as col;
use crate::keys;
use crate::model::{fields, Category, FieldValue, Job, JobStatus};
use crate::normalize::{
    clean_string, normalize_category, normalize_status_hint, parse_date, parse_money,
};
use crate::source::RawRow;
use chrono::NaiveDate;

/// Rows from outside the configured states/counties are skipped. Empty lists
/// allow everything; a row with no state (or county) is not filtered on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Jurisdiction {
    allowed_states: Vec<String>,
    allowed_counties: Vec<String>,
}

impl Jurisdiction {
    pub fn new(states: &[String], counties: &[String]) -> Self {
        Self {
            allowed_states: states
                .iter()
                .map(|s| keys::normalize_key(s))
                .filter(|s| !s.is_empty())
                .collect(),
            allowed_counties: counties
                .iter()
                .map(|s| county_key(s))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, state: &str, county: &str) -> bool {
        let state = keys::normalize_key(state);
        if !state.is_empty()
            && !self.allowed_states.is_empty()
            && !self.allowed_states.contains(&state)
        {
            return false;
        }
        let county = county_key(county);
        if !county.is_empty()
            && !self.allowed_counties.is_empty()
            && !self.allowed_counties.contains(&county)
        {
            return false;
        }
        true
    }
}

fn county_key(s: &str) -> String {
    let k = keys::normalize_key(s);
    k.strip_suffix(" county")
        .map(|v| v.trim().to_string())
        .unwrap_or(k)
}

/// A feed row after normalization, before matching.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingJob {
    pub external_id: Option<String>,
    pub dedupe_key: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub county: String,
    pub state: String,
    pub category: Option<Category>,
    pub status_hint: Option<JobStatus>,
    pub project_value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contractor: String,
    pub owner_name: String,
    pub architect: String,
    pub engineer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    Job(Box<IncomingJob>),
    Skip(&'static str),
}

pub const SKIP_MISSING_NAME: &str = "missing_name";
pub const SKIP_OUT_OF_JURISDICTION: &str = "out_of_jurisdiction";
pub const SKIP_LOCKED: &str = "locked";

pub fn parse_job_row(row: &RawRow, jurisdiction: &Jurisdiction) -> ParsedRow {
    let name = clean_string(row.pick(col::NAME));
    if name.is_empty() {
        return ParsedRow::Skip(SKIP_MISSING_NAME);
    }

    let state = clean_string(row.pick(col::STATE));
    let county = clean_string(row.pick(col::COUNTY));
    if !jurisdiction.allows(&state, &county) {
        return ParsedRow::Skip(SKIP_OUT_OF_JURISDICTION);
    }

    let address = keys::build_address(
        &clean_string(row.pick(col::STREET)),
        &clean_string(row.pick(col::CITY)),
        &state,
        &clean_string(row.pick(col::ZIP)),
    );
    let category = row.pick(col::CATEGORY).map(|c| normalize_category(Some(c)));

    ParsedRow::Job(Box::new(IncomingJob {
        external_id: keys::external_id(row.pick(col::EXTERNAL_ID)),
        dedupe_key: keys::dedupe_key(&name, &address, &county),
        name,
        description: clean_string(row.pick(col::DESCRIPTION)),
        address,
        county,
        state,
        category,
        status_hint: normalize_status_hint(row.pick(col::STATUS)),
        project_value: parse_money(row.pick(col::VALUE)),
        start_date: parse_date(row.pick(col::START_DATE)),
        end_date: parse_date(row.pick(col::END_DATE)),
        contractor: clean_string(row.pick(col::CONTRACTOR)),
        owner_name: clean_string(row.pick(col::OWNER_NAME)),
        architect: clean_string(row.pick(col::ARCHITECT)),
        engineer: clean_string(row.pick(col::ENGINEER)),
    }))
}

impl IncomingJob {
    /// Content fields offered to the merge. Status is handled by inference.
    pub fn candidates(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            (fields::NAME, FieldValue::text(&self.name)),
            (fields::DESCRIPTION, FieldValue::text(&self.description)),
            (fields::ADDRESS, FieldValue::text(&self.address)),
            (fields::COUNTY, FieldValue::text(&self.county)),
            (
                fields::CATEGORY,
                FieldValue::opt_text(self.category.map(Category::as_str)),
            ),
            (
                fields::PROJECT_VALUE,
                FieldValue::opt_number(self.project_value),
            ),
            (fields::START_DATE, FieldValue::opt_date(self.start_date)),
            (fields::END_DATE, FieldValue::opt_date(self.end_date)),
            (fields::CONTRACTOR, FieldValue::text(&self.contractor)),
            (fields::OWNER_NAME, FieldValue::text(&self.owner_name)),
            (fields::ARCHITECT, FieldValue::text(&self.architect)),
            (fields::ENGINEER, FieldValue::text(&self.engineer)),
        ]
    }

    pub fn to_job(&self, owner_id: Option<&str>, status: JobStatus) -> Job {
        let mut job = Job::new(&self.name);
        job.owner_id = owner_id.map(str::to_string);
        job.external_id = self.external_id.clone();
        job.dedupe_key = self.dedupe_key.clone();
        job.description = self.description.clone();
        job.address = self.address.clone();
        job.county = self.county.clone();
        job.category = self.category.unwrap_or(Category::DEFAULT);
        job.status = status;
        job.project_value = self.project_value;
        job.start_date = self.start_date;
        job.end_date = self.end_date;
        job.contractor = self.contractor.clone();
        job.owner_name = self.owner_name.clone();
        job.architect = self.architect.clone();
        job.engineer = self.engineer.clone();
        job
    }
}
