use crate::model::InteractionKind;
use crate::normalize::clean_string;
use crate::source::Cell;
use chrono::NaiveDate;

pub fn normalize_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `street, city, state, zip` with blank parts left out.
pub fn build_address(street: &str, city: &str, state: &str, zip: &str) -> String {
    [street, city, state, zip]
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Composite identity of a project when the feed gives no usable external id.
pub fn dedupe_key(name: &str, address: &str, county: &str) -> String {
    format!(
        "{}|{}|{}",
        normalize_key(name),
        normalize_key(address),
        normalize_key(county)
    )
}

pub fn external_id(cell: Option<&Cell>) -> Option<String> {
    let id = clean_string(cell);
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

pub fn company_key(name: &str) -> String {
    normalize_key(name)
}

/// Email identifies a contact on its own; otherwise the name within its company.
pub fn contact_key(email: &str, first: &str, last: &str, company_key: &str) -> String {
    let email = normalize_key(email);
    if !email.is_empty() {
        return format!("email:{email}");
    }
    format!(
        "name:{}|{}|{}",
        normalize_key(first),
        normalize_key(last),
        company_key
    )
}

pub fn interaction_key(
    company_key: &str,
    contact_key: Option<&str>,
    occurred_on: Option<NaiveDate>,
    kind: InteractionKind,
) -> String {
    format!(
        "{}|{}|{}|{}",
        company_key,
        contact_key.unwrap_or_default(),
        occurred_on
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        kind.as_str()
    )
}
