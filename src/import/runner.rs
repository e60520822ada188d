use super::index::DedupeIndex;
use super::job_row::{parse_job_row, IncomingJob, Jurisdiction, ParsedRow, SKIP_LOCKED};
use super::locks::{backfill_external_id, can_write, compute_merge, stamp_import};
use super::status::{infer_status, today_local};
use crate::columns::job as col;
use crate::keys;
use crate::model::{fields, FieldValue, Job};
use crate::normalize::clean_string;
use crate::source::RawRow;
use crate::store::{now_stamp, RecordStore};
use anyhow::Context;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Classify every row but write nothing.
    pub dry_run: bool,
    pub owner_id: Option<String>,
    /// Return the concrete records behind each count.
    pub include_entities: bool,
    pub jurisdiction: Jurisdiction,
    pub today: NaiveDate,
    /// Stamp written to `lastImportedAt` on every record this run touches.
    pub run_at: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            owner_id: None,
            include_entities: false,
            jurisdiction: Jurisdiction::default(),
            today: today_local(),
            run_at: now_stamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub row: usize,
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBuckets {
    pub imported: Vec<Job>,
    pub updated: Vec<Job>,
    pub unchanged: Vec<Job>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<ImportBuckets>,
}

#[derive(Debug)]
enum Outcome {
    Imported(Job),
    Updated(Job),
    Unchanged(Job),
    Skipped {
        reason: &'static str,
        name: Option<String>,
    },
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Imported(_) => "imported",
            Self::Updated(_) => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Skipped { reason, .. } => *reason,
        }
    }
}

impl ImportSummary {
    fn record(&mut self, line: usize, outcome: Outcome) {
        match outcome {
            Outcome::Imported(job) => {
                self.imported += 1;
                if let Some(b) = self.entities.as_mut() {
                    b.imported.push(job);
                }
            }
            Outcome::Updated(job) => {
                self.updated += 1;
                if let Some(b) = self.entities.as_mut() {
                    b.updated.push(job);
                }
            }
            Outcome::Unchanged(job) => {
                self.unchanged += 1;
                if let Some(b) = self.entities.as_mut() {
                    b.unchanged.push(job);
                }
            }
            Outcome::Skipped { reason, name } => {
                self.skipped += 1;
                if let Some(b) = self.entities.as_mut() {
                    b.skipped.push(SkippedRow {
                        row: line,
                        reason,
                        name,
                    });
                }
            }
        }
    }
}

/// Reconciles one batch of project rows against the store.
pub struct ImportRunner<'s, S> {
    store: &'s mut S,
    options: ImportOptions,
}

impl<'s, S: RecordStore<Job>> ImportRunner<'s, S> {
    pub fn new(store: &'s mut S, options: ImportOptions) -> Self {
        Self { store, options }
    }

    /// Rows are processed strictly in order. A failing row is reported in
    /// `errors` and does not stop the batch; only loading the existing
    /// records can fail the whole run.
    pub fn run(&mut self, rows: &[RawRow]) -> anyhow::Result<ImportSummary> {
        let existing = self
            .store
            .list_owned(self.options.owner_id.as_deref())
            .context("failed to load existing jobs")?;
        let mut index = DedupeIndex::build(existing);
        info!(
            "job import: {} rows against {} existing jobs (dry_run={})",
            rows.len(),
            index.len(),
            self.options.dry_run
        );

        let mut summary = ImportSummary {
            dry_run: self.options.dry_run,
            entities: self.options.include_entities.then(ImportBuckets::default),
            ..Default::default()
        };
        for row in rows {
            match self.process_row(row, &mut index) {
                Ok(outcome) => {
                    debug!("row {}: {}", row.line, outcome.label());
                    summary.record(row.line, outcome);
                }
                Err(e) => {
                    warn!("row {}: {:#}", row.line, e);
                    summary.errors.push(format!("row {}: {:#}", row.line, e));
                }
            }
        }

        info!(
            "job import done: imported={} updated={} unchanged={} skipped={} errors={}",
            summary.imported,
            summary.updated,
            summary.unchanged,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    fn process_row(
        &mut self,
        row: &RawRow,
        index: &mut DedupeIndex<Job>,
    ) -> anyhow::Result<Outcome> {
        let incoming = match parse_job_row(row, &self.options.jurisdiction) {
            ParsedRow::Job(job) => job,
            ParsedRow::Skip(reason) => {
                let name = clean_string(row.pick(col::NAME));
                return Ok(Outcome::Skipped {
                    reason,
                    name: (!name.is_empty()).then_some(name),
                });
            }
        };

        let matched = index
            .find(incoming.external_id.as_deref(), &incoming.dedupe_key)
            .cloned();
        match matched {
            None => self.create(&incoming, index),
            Some(current) => self.merge(current, &incoming, index),
        }
    }

    fn create(
        &mut self,
        incoming: &IncomingJob,
        index: &mut DedupeIndex<Job>,
    ) -> anyhow::Result<Outcome> {
        let status = infer_status(
            incoming.start_date,
            incoming.end_date,
            incoming.status_hint,
            self.options.today,
        );
        let mut job = incoming.to_job(self.options.owner_id.as_deref(), status);
        job.last_imported_at = Some(self.options.run_at.clone());

        let job = if self.options.dry_run {
            // Provisional id so later rows in the batch can merge into it.
            job.id = format!("dry-run-{}", uuid::Uuid::new_v4());
            job
        } else {
            self.store.create(job)?
        };
        index.insert(job.clone());
        Ok(Outcome::Imported(job))
    }

    fn merge(
        &mut self,
        current: Job,
        incoming: &IncomingJob,
        index: &mut DedupeIndex<Job>,
    ) -> anyhow::Result<Outcome> {
        let mut merge = compute_merge(&current, &incoming.candidates());

        let start = merge
            .patch
            .get(fields::START_DATE)
            .and_then(FieldValue::as_date)
            .or(current.start_date);
        let end = merge
            .patch
            .get(fields::END_DATE)
            .and_then(FieldValue::as_date)
            .or(current.end_date);
        // A locked status is never inferred; only a differing feed hint counts.
        if can_write(&current, fields::STATUS) {
            let inferred = infer_status(start, end, incoming.status_hint, self.options.today);
            if inferred != current.status {
                merge
                    .patch
                    .set(fields::STATUS, FieldValue::text(inferred.as_str()));
            }
        } else if incoming
            .status_hint
            .is_some_and(|hint| hint != current.status)
        {
            merge.blocked.push(fields::STATUS);
        }

        backfill_external_id(&current, incoming.external_id.as_deref(), &mut merge.patch);

        if !merge.changed() {
            if merge.blocked.is_empty() {
                return Ok(Outcome::Unchanged(current));
            }
            debug!(
                "job {}: locked fields {:?} differ",
                current.id, merge.blocked
            );
            return Ok(Outcome::Skipped {
                reason: SKIP_LOCKED,
                name: Some(current.name),
            });
        }

        let text_of = |field: &str, fallback: &str| -> String {
            merge
                .patch
                .get(field)
                .and_then(FieldValue::as_text)
                .unwrap_or(fallback)
                .to_string()
        };
        let dedupe_key = keys::dedupe_key(
            &text_of(fields::NAME, &current.name),
            &text_of(fields::ADDRESS, &current.address),
            &text_of(fields::COUNTY, &current.county),
        );
        if dedupe_key != current.dedupe_key {
            merge
                .patch
                .set(fields::DEDUPE_KEY, FieldValue::Text(dedupe_key));
        }
        debug!("job {}: writing {:?}", current.id, merge.patch.field_names());
        stamp_import(&mut merge.patch, &self.options.run_at);

        if !self.options.dry_run {
            self.store.update(&current.id, &merge.patch)?;
        }
        index.apply(&current.id, &merge.patch);
        let merged = index.get(&current.id).cloned().unwrap_or(current);
        Ok(Outcome::Updated(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, JobStatus, Record};
    use crate::source::Cell;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date")
    }

    fn options() -> ImportOptions {
        ImportOptions {
            today: today(),
            run_at: "2025-06-15T12:00:00Z".into(),
            include_entities: true,
            ..Default::default()
        }
    }

    fn iso(d: NaiveDate) -> Cell {
        Cell::Text(d.format("%Y-%m-%d").to_string())
    }

    fn row(line: usize, cells: &[(&str, Cell)]) -> RawRow {
        let mut r = RawRow::new(line);
        for (h, c) in cells {
            r.insert(h, c.clone());
        }
        r
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn run(store: &mut MemoryStore, opts: ImportOptions, rows: &[RawRow]) -> ImportSummary {
        ImportRunner::new(store, opts).run(rows).expect("batch runs")
    }

    fn riverside_rows() -> Vec<RawRow> {
        let start = iso(today() - Duration::days(14));
        vec![
            row(
                2,
                &[
                    ("Project Name", text("Riverside Plant")),
                    ("Address", text("100 Main St, Springfield, CA")),
                    ("Project Value", text("$2,000,000")),
                    ("Start Date", start.clone()),
                ],
            ),
            row(
                3,
                &[
                    ("Project Name", text("Riverside Plant")),
                    ("Address", text("100 Main St, Springfield, CA")),
                    ("Project Value", text("$2,500,000")),
                    ("Start Date", start),
                ],
            ),
        ]
    }

    #[test]
    fn riverside_plant_is_created_then_updated() {
        let mut store = MemoryStore::default();
        let summary = run(&mut store, options(), &riverside_rows());

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.updated, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(store.jobs.len(), 1);
        let job = &store.jobs[0];
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.project_value, Some(2_500_000.0));
        assert_eq!(job.last_imported_at.as_deref(), Some("2025-06-15T12:00:00Z"));
    }

    #[test]
    fn second_run_is_idempotent() {
        let mut store = MemoryStore::default();
        let rows = riverside_rows();
        run(&mut store, options(), &rows);
        let writes = store.writes;

        let again = run(&mut store, options(), &rows[1..]);
        assert_eq!(again.imported, 0);
        assert_eq!(again.updated, 0);
        assert_eq!(again.unchanged, 1);
        assert_eq!(store.writes, writes);
    }

    #[test]
    fn dry_run_matches_live_counts_without_writes() {
        let rows = riverside_rows();
        let mut dry_store = MemoryStore::default();
        let dry = run(
            &mut dry_store,
            ImportOptions {
                dry_run: true,
                ..options()
            },
            &rows,
        );
        assert_eq!(dry_store.writes, 0);
        assert!(dry_store.jobs.is_empty());
        assert!(dry.dry_run);

        let mut live_store = MemoryStore::default();
        let live = run(&mut live_store, options(), &rows);
        assert!(!live.dry_run);
        assert_eq!(
            (dry.imported, dry.updated, dry.unchanged, dry.skipped, dry.errors.len()),
            (live.imported, live.updated, live.unchanged, live.skipped, live.errors.len())
        );
    }

    fn seeded(store: &mut MemoryStore, name: &str, ext: Option<&str>) -> Job {
        let mut job = Job::new(name);
        job.external_id = ext.map(str::to_string);
        job.dedupe_key = keys::dedupe_key(name, "", "");
        job.project_value = Some(1_000_000.0);
        RecordStore::<Job>::create(store, job).expect("seed")
    }

    #[test]
    fn locked_name_survives_and_row_is_skipped() {
        let mut store = MemoryStore::default();
        let mut job = seeded(&mut store, "Harbor Terminal", Some("P-1"));
        job.locked_fields.insert(fields::NAME.to_string());
        store.jobs[0] = job;
        let writes = store.writes;

        let summary = run(
            &mut store,
            options(),
            &[row(2, &[("Project ID", text("P-1")), ("Name", text("Harbour Terminal"))])],
        );
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.writes, writes);
        assert_eq!(store.jobs[0].name, "Harbor Terminal");
        let buckets = summary.entities.as_ref().expect("entities");
        assert_eq!(buckets.skipped[0].reason, SKIP_LOCKED);

        let summary = run(
            &mut store,
            options(),
            &[row(
                2,
                &[
                    ("Project ID", text("P-1")),
                    ("Name", text("Harbour Terminal")),
                    ("Valuation", text("1,250,000")),
                ],
            )],
        );
        assert_eq!(summary.updated, 1);
        assert_eq!(store.jobs[0].name, "Harbor Terminal");
        assert_eq!(store.jobs[0].project_value, Some(1_250_000.0));
        assert!(store.jobs[0].is_locked(fields::NAME));
    }

    #[test]
    fn external_id_beats_dedupe_key() {
        let mut store = MemoryStore::default();
        seeded(&mut store, "Alpha", Some("P-1"));
        seeded(&mut store, "Bravo", None);

        let summary = run(
            &mut store,
            options(),
            &[row(
                2,
                &[
                    ("Project ID", text("P-1")),
                    ("Name", text("Bravo")),
                    ("Valuation", text("3000000")),
                ],
            )],
        );
        assert_eq!(summary.updated, 1);
        let alpha = store.jobs.iter().find(|j| j.external_id.as_deref() == Some("P-1"));
        assert_eq!(alpha.map(|j| j.name.as_str()), Some("Bravo"));
        assert_eq!(alpha.and_then(|j| j.project_value), Some(3_000_000.0));
        let bravo = store.jobs.iter().find(|j| j.external_id.is_none());
        assert_eq!(bravo.and_then(|j| j.project_value), Some(1_000_000.0));
    }

    #[test]
    fn duplicate_rows_create_one_job() {
        let mut store = MemoryStore::default();
        let r = row(
            2,
            &[("Name", text("Depot")), ("County", text("Kern"))],
        );
        let summary = run(&mut store, options(), &[r.clone(), r]);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(store.jobs.len(), 1);
    }

    #[test]
    fn status_follows_dates_unless_locked() {
        let yesterday = iso(today() - Duration::days(1));
        let mut store = MemoryStore::default();
        run(
            &mut store,
            options(),
            &[
                row(
                    2,
                    &[
                        ("Name", text("Started")),
                        ("Status", text("Planning")),
                        ("Start Date", yesterday.clone()),
                    ],
                ),
                row(
                    3,
                    &[
                        ("Name", text("Finished")),
                        ("Status", text("Under Construction")),
                        ("End Date", yesterday.clone()),
                    ],
                ),
            ],
        );
        let status_of = |store: &MemoryStore, name: &str| {
            store
                .jobs
                .iter()
                .find(|j| j.name == name)
                .map(|j| j.status)
        };
        assert_eq!(status_of(&store, "Started"), Some(JobStatus::Active));
        assert_eq!(status_of(&store, "Finished"), Some(JobStatus::Completed));

        let mut locked = seeded(&mut store, "Held", None);
        locked.status = JobStatus::Planning;
        locked.locked_fields.insert(fields::STATUS.to_string());
        let pos = store.jobs.iter().position(|j| j.id == locked.id).expect("seeded");
        store.jobs[pos] = locked;
        let summary = run(
            &mut store,
            options(),
            &[row(2, &[("Name", text("Held")), ("End Date", yesterday)])],
        );
        assert_eq!(summary.updated, 1);
        assert_eq!(status_of(&store, "Held"), Some(JobStatus::Planning));
    }

    #[test]
    fn start_moved_to_future_without_hint_returns_to_planning() {
        let mut store = MemoryStore::default();
        let first = run(
            &mut store,
            options(),
            &[row(
                2,
                &[
                    ("Name", text("Eastside Annex")),
                    ("Start Date", iso(today() - Duration::days(3))),
                ],
            )],
        );
        assert_eq!(first.imported, 1);
        assert_eq!(store.jobs[0].status, JobStatus::Active);

        let pushed = run(
            &mut store,
            options(),
            &[row(
                2,
                &[
                    ("Name", text("Eastside Annex")),
                    ("Start Date", iso(today() + Duration::days(30))),
                ],
            )],
        );
        assert_eq!(pushed.updated, 1);
        assert_eq!(store.jobs[0].status, JobStatus::Planning);
        assert_eq!(
            store.jobs[0].start_date,
            Some(today() + Duration::days(30))
        );
    }

    #[test]
    fn locked_status_ignores_inference_and_matching_hint() {
        let yesterday = iso(today() - Duration::days(1));
        let feed_row = |status: &str| {
            row(
                2,
                &[
                    ("Name", text("Harbor Mall")),
                    ("Status", text(status)),
                    ("End Date", yesterday.clone()),
                ],
            )
        };
        let mut store = MemoryStore::default();
        run(&mut store, options(), &[feed_row("Active")]);
        store.jobs[0].status = JobStatus::Active;
        store.jobs[0]
            .locked_fields
            .insert(fields::STATUS.to_string());

        let again = run(&mut store, options(), &[feed_row("Active")]);
        assert_eq!((again.unchanged, again.skipped, again.updated), (1, 0, 0));
        assert_eq!(store.jobs[0].status, JobStatus::Active);

        let differing = run(&mut store, options(), &[feed_row("Planning")]);
        assert_eq!(differing.skipped, 1);
        assert_eq!(store.jobs[0].status, JobStatus::Active);
    }

    #[test]
    fn store_failure_is_a_row_error() {
        let mut store = MemoryStore::failing_on("doomed");
        let summary = run(
            &mut store,
            options(),
            &[
                row(2, &[("Name", text("Doomed Tower"))]),
                row(3, &[("Name", text("Fine Tower"))]),
            ],
        );
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("row 2:"));
        assert_eq!(summary.imported, 1);
    }

    #[test]
    fn unnamed_and_foreign_rows_are_skipped() {
        let mut store = MemoryStore::default();
        let opts = ImportOptions {
            jurisdiction: Jurisdiction::new(&["CA".to_string()], &[]),
            ..options()
        };
        let summary = run(
            &mut store,
            opts,
            &[
                row(2, &[("Address", text("1 Elm"))]),
                row(3, &[("Name", text("Reno Depot")), ("State", text("NV"))]),
                row(4, &[("Name", text("Fresno Depot")), ("State", text("CA"))]),
            ],
        );
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.imported, 1);
        let buckets = summary.entities.expect("entities");
        assert_eq!(buckets.skipped[0].reason, "missing_name");
        assert_eq!(buckets.skipped[1].name.as_deref(), Some("Reno Depot"));
        assert_eq!(buckets.imported[0].category, Category::DEFAULT);
    }
}
