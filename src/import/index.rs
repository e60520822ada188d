use crate::model::{FieldPatch, Record};
use std::collections::HashMap;

/// Per-batch lookup over the records a run may merge into.
///
/// Records live in one map keyed by id; the external-id and dedupe-key maps
/// point into it. Built once per batch and dropped with it.
#[derive(Debug, Clone)]
pub struct DedupeIndex<R> {
    records: HashMap<String, R>,
    by_external_id: HashMap<String, String>,
    by_dedupe_key: HashMap<String, String>,
}

impl<R: Record> DedupeIndex<R> {
    /// On colliding keys the earliest record in `records` keeps the slot.
    pub fn build(records: Vec<R>) -> Self {
        let mut index = Self {
            records: HashMap::with_capacity(records.len()),
            by_external_id: HashMap::new(),
            by_dedupe_key: HashMap::new(),
        };
        for r in records {
            let id = r.id().to_string();
            if let Some(ext) = r.external_id().filter(|s| !s.is_empty()) {
                index
                    .by_external_id
                    .entry(ext.to_string())
                    .or_insert_with(|| id.clone());
            }
            if !r.dedupe_key().is_empty() {
                index
                    .by_dedupe_key
                    .entry(r.dedupe_key().to_string())
                    .or_insert_with(|| id.clone());
            }
            index.records.insert(id, r);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// External id first, then dedupe key. `None` means "create".
    pub fn find(&self, external_id: Option<&str>, dedupe_key: &str) -> Option<&R> {
        let by_ext = external_id
            .filter(|s| !s.is_empty())
            .and_then(|ext| self.by_external_id.get(ext));
        let id = by_ext.or_else(|| self.by_dedupe_key.get(dedupe_key))?;
        self.records.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    /// Register a record created during this batch so later rows match it.
    pub fn insert(&mut self, record: R) {
        let id = record.id().to_string();
        if let Some(ext) = record.external_id().filter(|s| !s.is_empty()) {
            self.by_external_id.insert(ext.to_string(), id.clone());
        }
        if !record.dedupe_key().is_empty() {
            self.by_dedupe_key
                .insert(record.dedupe_key().to_string(), id.clone());
        }
        self.records.insert(id, record);
    }

    /// Apply a merge patch to the indexed copy and re-key it if its identity moved.
    pub fn apply(&mut self, id: &str, patch: &FieldPatch) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        let old_key = record.dedupe_key().to_string();
        record.apply(patch);
        let new_key = record.dedupe_key().to_string();
        let new_ext = record.external_id().map(str::to_string);

        if new_key != old_key {
            if self.by_dedupe_key.get(&old_key).map(String::as_str) == Some(id) {
                self.by_dedupe_key.remove(&old_key);
            }
            if !new_key.is_empty() {
                self.by_dedupe_key
                    .entry(new_key)
                    .or_insert_with(|| id.to_string());
            }
        }
        if let Some(ext) = new_ext.filter(|s| !s.is_empty()) {
            self.by_external_id
                .entry(ext)
                .or_insert_with(|| id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::dedupe_key;
    use crate::model::{fields, FieldValue, Job};

    fn job(id: &str, ext: Option<&str>, name: &str) -> Job {
        let mut j = Job::new(name);
        j.id = id.to_string();
        j.external_id = ext.map(str::to_string);
        j.dedupe_key = dedupe_key(name, "", "");
        j
    }

    #[test]
    fn external_id_wins_over_dedupe_key() {
        let index = DedupeIndex::build(vec![
            job("a", Some("EXT-1"), "Alpha"),
            job("b", None, "Bravo"),
        ]);
        let hit = index.find(Some("EXT-1"), &dedupe_key("Bravo", "", ""));
        assert_eq!(hit.map(|j| j.id.as_str()), Some("a"));
    }

    #[test]
    fn unmatched_external_id_falls_back_to_dedupe_key() {
        let index = DedupeIndex::build(vec![job("b", None, "Bravo")]);
        let hit = index.find(Some("EXT-9"), &dedupe_key("bravo", "", ""));
        assert_eq!(hit.map(|j| j.id.as_str()), Some("b"));
        assert!(index.find(None, &dedupe_key("Charlie", "", "")).is_none());
    }

    #[test]
    fn inserted_records_are_visible_immediately() {
        let mut index = DedupeIndex::build(Vec::new());
        assert_eq!(index.len(), 0);
        index.insert(job("new-1", Some("EXT-2"), "Delta"));
        assert!(index.find(None, &dedupe_key("Delta", "", "")).is_some());
        assert!(index.find(Some("EXT-2"), "nothing").is_some());
    }

    #[test]
    fn apply_rekeys_renamed_records() {
        let mut index = DedupeIndex::build(vec![job("a", None, "Alpha")]);
        let mut patch = FieldPatch::new();
        patch.set(fields::NAME, FieldValue::text("Alpha Two"));
        patch.set(
            fields::DEDUPE_KEY,
            FieldValue::Text(dedupe_key("Alpha Two", "", "")),
        );
        patch.set(fields::EXTERNAL_ID, FieldValue::text("EXT-3"));
        index.apply("a", &patch);

        assert!(index.find(None, &dedupe_key("Alpha", "", "")).is_none());
        let hit = index.find(None, &dedupe_key("Alpha Two", "", ""));
        assert_eq!(hit.map(|j| j.name.as_str()), Some("Alpha Two"));
        assert!(index.find(Some("EXT-3"), "").is_some());
        assert_eq!(index.get("a").map(|j| j.name.as_str()), Some("Alpha Two"));
    }
}
