use crate::model::{Category, InteractionKind, JobStatus};
use crate::source::Cell;
use chrono::{Duration, NaiveDate};

/// Excel serial of 1970-01-01.
const EXCEL_UNIX_EPOCH: f64 = 25569.0;
/// Excel serial of 9999-12-31.
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

const DATE_SENTINELS: &[&str] = &["nat", "nan", "none", "null"];

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Industrial,
        &[
            "water",
            "sewer",
            "utility",
            "utilities",
            "treatment",
            "plant",
            "manufactur",
            "warehouse",
            "industrial",
            "power",
            "energy",
        ],
    ),
    (
        Category::Infrastructure,
        &[
            "road",
            "highway",
            "bridge",
            "paving",
            "transit",
            "airport",
            "infrastructure",
        ],
    ),
    (
        Category::Commercial,
        &[
            "school",
            "university",
            "college",
            "hospital",
            "medical",
            "nursing",
            "office",
            "retail",
            "hotel",
            "church",
            "library",
            "restaurant",
            "commercial",
        ],
    ),
    (
        Category::Residential,
        &[
            "residential",
            "apartment",
            "housing",
            "condo",
            "multifamily",
            "multi-family",
            "single family",
            "townhome",
            "home",
        ],
    ),
];

const STATUS_KEYWORDS: &[(JobStatus, &[&str])] = &[
    (JobStatus::Completed, &["complete", "closed", "finished"]),
    (
        JobStatus::Pending,
        &["pending", "on hold", "deferred", "postponed"],
    ),
    (
        JobStatus::Planning,
        &[
            "new project",
            "new construction",
            "planning",
            "design",
            "bid",
            "proposed",
            "conceptual",
            "pre-construction",
        ],
    ),
    (
        JobStatus::Active,
        &[
            "active",
            "renovation",
            "addition",
            "alteration",
            "remodel",
            "under construction",
            "in progress",
            "started",
        ],
    ),
];

const INTERACTION_KEYWORDS: &[(InteractionKind, &[&str])] = &[
    (InteractionKind::SiteVisit, &["site", "visit", "walk"]),
    (InteractionKind::Meeting, &["meeting", "lunch", "demo", "presentation"]),
    (InteractionKind::Email, &["email", "e-mail"]),
    (InteractionKind::Call, &["call", "phone", "voicemail"]),
];

fn keyword_match<T: Copy>(table: &[(T, &[&str])], text: &str) -> Option<T> {
    let lowered = text.to_lowercase();
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(v, _)| *v)
}

fn number_to_string(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Trimmed text form of any cell; missing and empty cells give `""`.
pub fn clean_string(cell: Option<&Cell>) -> String {
    match cell {
        None | Some(Cell::Empty) => String::new(),
        Some(Cell::Text(s)) => s.trim().to_string(),
        Some(Cell::Number(n)) => number_to_string(*n),
        Some(Cell::Bool(b)) => b.to_string(),
    }
}

/// Monetary amount in whole currency units. Ranges resolve to their upper bound.
pub fn parse_money(cell: Option<&Cell>) -> Option<f64> {
    match cell? {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => money_from_text(s),
        _ => None,
    }
}

fn is_range_separator(c: char) -> bool {
    c == '-' || c == '–'
}

fn money_from_text(raw: &str) -> Option<f64> {
    let lowered = raw.trim().to_lowercase().replace("usd", "");
    let cleaned: String = lowered
        .chars()
        .filter(|c| !matches!(*c, '$' | ',' | '€' | '£') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // A lone leading minus is a sign, not a range separator.
    let (sign, body) = match cleaned.strip_prefix('-') {
        Some(rest) if !rest.contains(is_range_separator) => (-1.0, rest),
        _ => (1.0, cleaned.as_str()),
    };

    let mut upper: Option<f64> = None;
    for part in body.split(is_range_separator) {
        let v = part.parse::<f64>().ok().filter(|v| v.is_finite())?;
        upper = Some(upper.map_or(v, |u: f64| u.max(v)));
    }
    upper.map(|v| sign * v)
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    let days = (serial - EXCEL_UNIX_EPOCH).floor() as i64;
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(Duration::days(days))
}

/// Calendar date from an Excel serial number or one of the
/// accepted text layouts. Unparseable input yields `None`.
pub fn parse_date(cell: Option<&Cell>) -> Option<NaiveDate> {
    match cell? {
        Cell::Number(n) => excel_serial_to_date(*n),
        Cell::Text(s) => date_from_text(s),
        _ => None,
    }
}

fn date_from_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() || DATE_SENTINELS.contains(&s.to_ascii_lowercase().as_str()) {
        return None;
    }

    // YYYY-MM-DD, optionally followed by a time part.
    if let Some(head) = s.get(..10) {
        let rest = &s[10..];
        if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T') {
            if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                return Some(d);
            }
        }
    }

    for fmt in ["%m/%d/%Y", "%d-%b-%y", "%d-%b-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

pub fn normalize_category(cell: Option<&Cell>) -> Category {
    let text = clean_string(cell);
    if text.is_empty() {
        return Category::DEFAULT;
    }
    keyword_match(CATEGORY_KEYWORDS, &text).unwrap_or(Category::DEFAULT)
}

/// Status suggested by free-text status / work-type columns, if any keyword matches.
pub fn normalize_status_hint(cell: Option<&Cell>) -> Option<JobStatus> {
    let text = clean_string(cell);
    if text.is_empty() {
        return None;
    }
    keyword_match(STATUS_KEYWORDS, &text)
}

pub fn normalize_interaction_kind(cell: Option<&Cell>) -> InteractionKind {
    keyword_match(INTERACTION_KEYWORDS, &clean_string(cell)).unwrap_or(InteractionKind::Note)
}
