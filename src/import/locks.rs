use crate::model::{fields, FieldPatch, FieldValue, Record};

pub fn can_write<R: Record>(record: &R, field: &str) -> bool {
    !record.is_locked(field)
}

/// Outcome of comparing incoming values against a stored record.
#[derive(Debug, Clone, Default)]
pub struct Merge {
    /// Differing, writable fields.
    pub patch: FieldPatch,
    /// Differing fields the record has locked.
    pub blocked: Vec<&'static str>,
}

impl Merge {
    pub fn changed(&self) -> bool {
        !self.patch.is_empty()
    }
}

/// Incoming `Null` means the feed had no value for the field; it never clears
/// stored content. The record's lock set is only read.
pub fn compute_merge<R: Record>(record: &R, incoming: &[(&'static str, FieldValue)]) -> Merge {
    let mut merge = Merge::default();
    for &(field, ref value) in incoming {
        if value.is_null() || record.field(field) == *value {
            continue;
        }
        if can_write(record, field) {
            merge.patch.set(field, value.clone());
        } else {
            merge.blocked.push(field);
        }
    }
    merge
}

/// Fill a missing external id. Locks do not apply: an empty identity is not
/// user-authored content.
pub fn backfill_external_id<R: Record>(record: &R, incoming: Option<&str>, patch: &mut FieldPatch) {
    if record.external_id().is_some() {
        return;
    }
    if let Some(id) = incoming.map(str::trim).filter(|s| !s.is_empty()) {
        patch.set(fields::EXTERNAL_ID, FieldValue::Text(id.to_string()));
    }
}

pub fn stamp_import(patch: &mut FieldPatch, run_at: &str) {
    patch.set(fields::LAST_IMPORTED_AT, FieldValue::Text(run_at.to_string()));
}
