use super::index::DedupeIndex;
use super::locks::{backfill_external_id, compute_merge, stamp_import};
use super::runner::ImportOptions;
use crate::columns::activity as col;
use crate::keys;
use crate::model::{fields, Company, Contact, FieldValue, Interaction, Record};
use crate::normalize::{clean_string, normalize_interaction_kind, parse_date};
use crate::source::RawRow;
use crate::store::RecordStore;
use anyhow::Context;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;

/// Per-kind classification counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl Tally {
    fn add(&mut self, upsert: Upsert) {
        match upsert {
            Upsert::Imported => self.imported += 1,
            Upsert::Updated => self.updated += 1,
            Upsert::Unchanged => self.unchanged += 1,
            Upsert::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub rows: usize,
    /// Rows with no usable company.
    pub skipped: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub companies: Tally,
    pub contacts: Tally,
    pub interactions: Tally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Imported,
    Updated,
    Unchanged,
    Skipped,
}

struct Indexes {
    companies: DedupeIndex<Company>,
    contacts: DedupeIndex<Contact>,
    interactions: DedupeIndex<Interaction>,
}

/// Match-or-create one record and merge unlocked differences into it.
fn upsert<R: Record, S: RecordStore<R>>(
    store: &mut S,
    index: &mut DedupeIndex<R>,
    fresh: R,
    candidates: &[(&'static str, FieldValue)],
    options: &ImportOptions,
) -> anyhow::Result<(Upsert, String)> {
    let Some(current) = index.find(fresh.external_id(), fresh.dedupe_key()).cloned() else {
        let created = if options.dry_run {
            let mut r = fresh;
            r.set_id(format!("dry-run-{}", uuid::Uuid::new_v4()));
            r
        } else {
            store.create(fresh)?
        };
        let id = created.id().to_string();
        index.insert(created);
        return Ok((Upsert::Imported, id));
    };

    let id = current.id().to_string();
    let mut merge = compute_merge(&current, candidates);
    backfill_external_id(&current, fresh.external_id(), &mut merge.patch);
    if !merge.changed() {
        let outcome = if merge.blocked.is_empty() {
            Upsert::Unchanged
        } else {
            Upsert::Skipped
        };
        return Ok((outcome, id));
    }

    // A locked identity field keeps the record under its old key.
    if merge.blocked.is_empty() && current.dedupe_key() != fresh.dedupe_key() {
        merge.patch.set(
            fields::DEDUPE_KEY,
            FieldValue::Text(fresh.dedupe_key().to_string()),
        );
    }
    stamp_import(&mut merge.patch, &options.run_at);
    if !options.dry_run {
        store.update(&id, &merge.patch)?;
    }
    index.apply(&id, &merge.patch);
    Ok((Upsert::Updated, id))
}

/// Reconciles a sales-activity batch: each row names a company and optionally
/// a contact at it and one interaction with them.
pub struct ActivityImportRunner<'s, S> {
    store: &'s mut S,
    options: ImportOptions,
}

impl<'s, S> ActivityImportRunner<'s, S>
where
    S: RecordStore<Company> + RecordStore<Contact> + RecordStore<Interaction>,
{
    pub fn new(store: &'s mut S, options: ImportOptions) -> Self {
        Self { store, options }
    }

    pub fn run(&mut self, rows: &[RawRow]) -> anyhow::Result<ActivitySummary> {
        let owner = self.options.owner_id.as_deref();
        let companies = RecordStore::<Company>::list_owned(&*self.store, owner)
            .context("failed to load existing companies")?;
        let contacts = RecordStore::<Contact>::list_owned(&*self.store, owner)
            .context("failed to load existing contacts")?;
        let interactions = RecordStore::<Interaction>::list_owned(&*self.store, owner)
            .context("failed to load existing interactions")?;
        let mut idx = Indexes {
            companies: DedupeIndex::build(companies),
            contacts: DedupeIndex::build(contacts),
            interactions: DedupeIndex::build(interactions),
        };
        info!(
            "activity import: {} rows against {} companies, {} contacts (dry_run={})",
            rows.len(),
            idx.companies.len(),
            idx.contacts.len(),
            self.options.dry_run
        );

        let mut summary = ActivitySummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };
        for row in rows {
            summary.rows += 1;
            if let Err(e) = self.process_row(row, &mut idx, &mut summary) {
                warn!("row {}: {:#}", row.line, e);
                summary.errors.push(format!("row {}: {:#}", row.line, e));
            }
        }

        info!(
            "activity import done: companies={:?} contacts={:?} interactions={:?} skipped={} errors={}",
            summary.companies,
            summary.contacts,
            summary.interactions,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    fn process_row(
        &mut self,
        row: &RawRow,
        idx: &mut Indexes,
        summary: &mut ActivitySummary,
    ) -> anyhow::Result<()> {
        let company_name = clean_string(row.pick(col::COMPANY_NAME));
        if company_name.is_empty() {
            debug!("row {}: no company", row.line);
            summary.skipped += 1;
            return Ok(());
        }
        let state = clean_string(row.pick(col::STATE));
        if !self.options.jurisdiction.allows(&state, "") {
            debug!("row {}: out of jurisdiction", row.line);
            summary.skipped += 1;
            return Ok(());
        }

        let owner_id = self.options.owner_id.clone();
        let run_at = Some(self.options.run_at.clone());
        let company_key = keys::company_key(&company_name);
        let company = Company {
            id: String::new(),
            owner_id: owner_id.clone(),
            external_id: keys::external_id(row.pick(col::COMPANY_ID)),
            dedupe_key: company_key.clone(),
            name: company_name,
            industry: clean_string(row.pick(col::INDUSTRY)),
            phone: clean_string(row.pick(col::COMPANY_PHONE)),
            website: clean_string(row.pick(col::WEBSITE)),
            city: clean_string(row.pick(col::CITY)),
            state,
            locked_fields: BTreeSet::new(),
            last_imported_at: run_at.clone(),
        };
        let candidates = vec![
            (fields::NAME, FieldValue::text(&company.name)),
            (fields::INDUSTRY, FieldValue::text(&company.industry)),
            (fields::PHONE, FieldValue::text(&company.phone)),
            (fields::WEBSITE, FieldValue::text(&company.website)),
            (fields::CITY, FieldValue::text(&company.city)),
            (fields::STATE, FieldValue::text(&company.state)),
        ];
        let (outcome, company_id) = upsert(
            &mut *self.store,
            &mut idx.companies,
            company,
            &candidates,
            &self.options,
        )
        .context("company")?;
        summary.companies.add(outcome);

        let mut contact_key = None;
        let mut contact_id = None;
        if let Some(contact) = contact_from_row(row, &company_key, &company_id) {
            let contact = Contact {
                owner_id: owner_id.clone(),
                last_imported_at: run_at.clone(),
                ..contact
            };
            let candidates = vec![
                (fields::FIRST_NAME, FieldValue::text(&contact.first_name)),
                (fields::LAST_NAME, FieldValue::text(&contact.last_name)),
                (fields::EMAIL, FieldValue::text(&contact.email)),
                (fields::PHONE, FieldValue::text(&contact.phone)),
                (fields::TITLE, FieldValue::text(&contact.title)),
                (fields::COMPANY_ID, FieldValue::text(&company_id)),
            ];
            contact_key = Some(contact.dedupe_key.clone());
            let (outcome, id) = upsert(
                &mut *self.store,
                &mut idx.contacts,
                contact,
                &candidates,
                &self.options,
            )
            .context("contact")?;
            summary.contacts.add(outcome);
            contact_id = Some(id);
        }

        let occurred_on = parse_date(row.pick(col::DATE));
        let notes = clean_string(row.pick(col::NOTES));
        if occurred_on.is_none() && notes.is_empty() {
            return Ok(());
        }
        let kind = normalize_interaction_kind(row.pick(col::KIND));
        let interaction = Interaction {
            id: String::new(),
            owner_id,
            company_id: Some(company_id),
            contact_id,
            dedupe_key: keys::interaction_key(
                &company_key,
                contact_key.as_deref(),
                occurred_on,
                kind,
            ),
            kind,
            occurred_on,
            notes,
            locked_fields: BTreeSet::new(),
            last_imported_at: run_at,
        };
        let candidates = vec![(fields::NOTES, FieldValue::text(&interaction.notes))];
        let (outcome, _) = upsert(
            &mut *self.store,
            &mut idx.interactions,
            interaction,
            &candidates,
            &self.options,
        )
        .context("interaction")?;
        summary.interactions.add(outcome);
        Ok(())
    }
}

/// Contact columns, if the row names a person at all. A lone full-name
/// column is split at the first space.
fn contact_from_row(row: &RawRow, company_key: &str, company_id: &str) -> Option<Contact> {
    let mut first = clean_string(row.pick(col::FIRST_NAME));
    let mut last = clean_string(row.pick(col::LAST_NAME));
    if first.is_empty() && last.is_empty() {
        let full = clean_string(row.pick(col::FULL_NAME));
        if let Some((f, l)) = full.split_once(char::is_whitespace) {
            first = f.to_string();
            last = l.trim().to_string();
        } else {
            first = full;
        }
    }
    let email = clean_string(row.pick(col::EMAIL));
    if first.is_empty() && last.is_empty() && email.is_empty() {
        return None;
    }
    Some(Contact {
        id: String::new(),
        owner_id: None,
        company_id: Some(company_id.to_string()),
        external_id: keys::external_id(row.pick(col::CONTACT_ID)),
        dedupe_key: keys::contact_key(&email, &first, &last, company_key),
        first_name: first,
        last_name: last,
        email,
        phone: clean_string(row.pick(col::CONTACT_PHONE)),
        title: clean_string(row.pick(col::TITLE)),
        locked_fields: BTreeSet::new(),
        last_imported_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InteractionKind;
    use crate::source::Cell;
    use crate::store::memory::MemoryStore;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn row(line: usize, cells: &[(&str, &str)]) -> RawRow {
        let mut r = RawRow::new(line);
        for (h, v) in cells {
            r.insert(h, text(v));
        }
        r
    }

    fn options() -> ImportOptions {
        ImportOptions {
            run_at: "2025-06-15T12:00:00Z".into(),
            ..Default::default()
        }
    }

    fn batch() -> Vec<RawRow> {
        vec![
            row(
                2,
                &[
                    ("Company", "Acme Builders"),
                    ("Industry", "General Contractor"),
                    ("First Name", "Pat"),
                    ("Last Name", "Lee"),
                    ("Email", "pat@acme.com"),
                    ("Date", "2025-05-02"),
                    ("Type", "Phone call"),
                    ("Notes", "Intro call"),
                ],
            ),
            row(
                3,
                &[
                    ("Company", "  Acme Builders "),
                    ("Industry", "General Contractor"),
                    ("Contact", "Sam Ortiz"),
                    ("Date", "2025-05-09"),
                    ("Type", "Site walk"),
                ],
            ),
            row(4, &[("Email", "nobody@example.com")]),
        ]
    }

    fn run(store: &mut MemoryStore, opts: ImportOptions, rows: &[RawRow]) -> ActivitySummary {
        ActivityImportRunner::new(store, opts)
            .run(rows)
            .expect("batch runs")
    }

    #[test]
    fn companies_dedupe_within_a_batch() {
        let mut store = MemoryStore::default();
        let summary = run(&mut store, options(), &batch());

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.companies.imported, 1);
        assert_eq!(summary.companies.unchanged, 1);
        assert_eq!(summary.contacts.imported, 2);
        assert_eq!(summary.interactions.imported, 2);
        assert_eq!(store.companies.len(), 1);

        let sam = store
            .contacts
            .iter()
            .find(|c| c.first_name == "Sam")
            .expect("split full name");
        assert_eq!(sam.last_name, "Ortiz");
        assert_eq!(sam.company_id.as_deref(), Some(store.companies[0].id.as_str()));

        let walk = store
            .interactions
            .iter()
            .find(|i| i.kind == InteractionKind::SiteVisit)
            .expect("site visit");
        assert_eq!(walk.contact_id.as_deref(), Some(sam.id.as_str()));
    }

    #[test]
    fn rerun_changes_nothing() {
        let mut store = MemoryStore::default();
        run(&mut store, options(), &batch());
        let writes = store.writes;

        let again = run(&mut store, options(), &batch());
        assert_eq!(again.companies.imported + again.contacts.imported, 0);
        assert_eq!(again.interactions.imported, 0);
        assert_eq!(again.interactions.unchanged, 2);
        assert_eq!(store.writes, writes);
    }

    #[test]
    fn dry_run_classifies_identically() {
        let mut dry_store = MemoryStore::default();
        let dry = run(
            &mut dry_store,
            ImportOptions {
                dry_run: true,
                ..options()
            },
            &batch(),
        );
        let mut live_store = MemoryStore::default();
        let live = run(&mut live_store, options(), &batch());

        assert_eq!(dry_store.writes, 0);
        assert_eq!(dry.companies, live.companies);
        assert_eq!(dry.contacts, live.contacts);
        assert_eq!(dry.interactions, live.interactions);
    }

    #[test]
    fn changed_notes_update_the_interaction() {
        let mut store = MemoryStore::default();
        run(&mut store, options(), &batch()[..1]);

        let edited = row(
            2,
            &[
                ("Company", "Acme Builders"),
                ("Email", "pat@acme.com"),
                ("First Name", "Pat"),
                ("Last Name", "Lee"),
                ("Date", "2025-05-02"),
                ("Type", "Phone call"),
                ("Notes", "Intro call, wants bid list"),
            ],
        );
        let summary = run(&mut store, options(), &[edited]);
        assert_eq!(summary.interactions.updated, 1);
        assert_eq!(store.interactions.len(), 1);
        assert_eq!(store.interactions[0].notes, "Intro call, wants bid list");
    }

    #[test]
    fn interaction_links_contact_matched_by_external_id() {
        let mut store = MemoryStore::default();
        run(
            &mut store,
            options(),
            &[row(
                2,
                &[
                    ("Company", "Acme Builders"),
                    ("Contact ID", "C-1"),
                    ("First Name", "Pat"),
                    ("Last Name", "Lee"),
                ],
            )],
        );
        store.contacts[0]
            .locked_fields
            .insert(fields::LAST_NAME.to_string());
        let pat_id = store.contacts[0].id.clone();

        let summary = run(
            &mut store,
            options(),
            &[row(
                3,
                &[
                    ("Company", "Acme Builders"),
                    ("Contact ID", "C-1"),
                    ("First Name", "Pat"),
                    ("Last Name", "Lee-Smith"),
                    ("Date", "2025-05-20"),
                    ("Notes", "Bid walkthrough"),
                ],
            )],
        );
        assert_eq!(summary.contacts.skipped, 1);
        assert_eq!(store.contacts.len(), 1);
        assert_eq!(store.contacts[0].last_name, "Lee");
        assert_eq!(summary.interactions.imported, 1);
        assert_eq!(store.interactions[0].contact_id.as_deref(), Some(pat_id.as_str()));
    }

    #[test]
    fn locked_company_field_is_reported_as_skipped() {
        let mut store = MemoryStore::default();
        run(&mut store, options(), &batch()[..1]);
        store.companies[0]
            .locked_fields
            .insert(fields::INDUSTRY.to_string());

        let summary = run(
            &mut store,
            options(),
            &[row(2, &[("Company", "Acme Builders"), ("Industry", "Developer")])],
        );
        assert_eq!(summary.companies.skipped, 1);
        assert_eq!(store.companies[0].industry, "General Contractor");
    }
}
