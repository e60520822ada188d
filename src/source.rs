use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Batch-level failures: the whole source is unusable and nothing is imported.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("source has no header row")]
    MissingHeader,
    #[error("source is not tabular: {0}")]
    NotTabular(String),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// One loosely-typed cell as delivered by a feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Empty),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

fn header_key(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A feed row keyed by normalized header name.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// 1-based position in the source, used in error messages.
    pub line: usize,
    cells: HashMap<String, Cell>,
}

impl RawRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with(mut self, header: &str, cell: Cell) -> Self {
        self.insert(header, cell);
        self
    }

    /// Duplicate headers keep the first non-blank value.
    pub fn insert(&mut self, header: &str, cell: Cell) {
        let key = header_key(header);
        if key.is_empty() {
            return;
        }
        match self.cells.get(&key) {
            Some(existing) if !existing.is_blank() => {}
            _ => {
                self.cells.insert(key, cell);
            }
        }
    }

    pub fn get(&self, header: &str) -> Option<&Cell> {
        self.cells.get(&header_key(header))
    }

    /// First non-blank cell among `aliases`, tried in order.
    pub fn pick(&self, aliases: &[&str]) -> Option<&Cell> {
        aliases
            .iter()
            .filter_map(|a| self.get(a))
            .find(|c| !c.is_blank())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(Cell::is_blank)
    }
}

/// Rows plus provenance for one batch.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub label: String,
    pub sha256: String,
    pub rows: Vec<RawRow>,
}

/// Upstream producer of already-tabular rows.
pub trait RowSource {
    fn load(self) -> Result<SourceBatch, SourceError>;
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RowSource for CsvFileSource {
    fn load(self) -> Result<SourceBatch, SourceError> {
        let label = self.path.to_string_lossy().to_string();
        let bytes = std::fs::read(&self.path).map_err(|source| SourceError::Io {
            path: label.clone(),
            source,
        })?;
        let rows = parse_csv_rows(&bytes)?;
        Ok(SourceBatch {
            label,
            sha256: sha256_hex(&bytes),
            rows,
        })
    }
}

pub fn parse_csv_rows(bytes: &[u8]) -> Result<Vec<RawRow>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| header_key(h).is_empty()) {
        return Err(SourceError::MissingHeader);
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 2);
        let mut row = RawRow::new(line);
        for (h, v) in headers.iter().zip(record.iter()) {
            let cell = if v.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(v.to_string())
            };
            row.insert(h, cell);
        }
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Rows already extracted upstream (e.g. from a spreadsheet) and passed inline
/// as a JSON array of objects. Numbers stay numeric so Excel date serials survive.
pub struct JsonRowsSource {
    label: String,
    rows: Value,
}

impl JsonRowsSource {
    pub fn new(label: impl Into<String>, rows: Value) -> Self {
        Self {
            label: label.into(),
            rows,
        }
    }
}

impl RowSource for JsonRowsSource {
    fn load(self) -> Result<SourceBatch, SourceError> {
        let Some(items) = self.rows.as_array() else {
            return Err(SourceError::NotTabular(
                "rows must be an array of objects".to_string(),
            ));
        };
        let mut rows = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let Some(obj) = item.as_object() else {
                return Err(SourceError::NotTabular(format!(
                    "row {} is not an object",
                    i + 1
                )));
            };
            let mut row = RawRow::new(i + 1);
            for (k, v) in obj {
                row.insert(k, Cell::from_json(v));
            }
            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }
        let bytes = serde_json::to_vec(&self.rows)
            .map_err(|e| SourceError::NotTabular(e.to_string()))?;
        Ok(SourceBatch {
            label: self.label,
            sha256: sha256_hex(&bytes),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_tries_aliases_in_order_and_skips_blanks() {
        let row = RawRow::new(2)
            .with("Project Value", Cell::Empty)
            .with("  valuation ", Cell::Text("$10".into()))
            .with("High Value", Cell::Text("$20".into()));
        let picked = row.pick(&["Project Value", "Valuation", "High Value"]);
        assert_eq!(picked, Some(&Cell::Text("$10".into())));
        assert_eq!(row.pick(&["Low Value"]), None);
    }

    #[test]
    fn csv_rows_keep_file_line_numbers_and_drop_blank_lines() {
        let text = "\u{feff}Project Name,Project Value\nRiverside Plant,\"$2,000,000\"\n,\nDepot,5\n";
        let rows = parse_csv_rows(text.as_bytes()).expect("parse csv");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(
            rows[0].get("project name"),
            Some(&Cell::Text("Riverside Plant".into()))
        );
        assert_eq!(
            rows[0].get("Project Value"),
            Some(&Cell::Text("$2,000,000".into()))
        );
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn csv_with_short_records_is_tolerated() {
        let rows = parse_csv_rows(b"Name,County,Zip\nA,Kern\n").expect("parse csv");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("zip"), None);
    }

    #[test]
    fn non_utf8_csv_is_a_batch_failure() {
        let bytes = [b'N', b'a', b'm', b'e', b'\n', 0xff, 0xfe, 0x00, b'\n'];
        let e = parse_csv_rows(&bytes).expect_err("binary input");
        assert!(matches!(e, SourceError::Csv(_)));
    }

    #[test]
    fn json_rows_keep_numbers_and_reject_non_objects() {
        let batch = JsonRowsSource::new(
            "inline",
            json!([{ "Project Name": "A", "Start Date": 45292 }, {}]),
        )
        .load()
        .expect("load rows");
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(
            batch.rows[0].get("start date"),
            Some(&Cell::Number(45292.0))
        );
        assert_eq!(batch.sha256.len(), 64);

        let e = JsonRowsSource::new("inline", json!([1, 2]))
            .load()
            .expect_err("not objects");
        assert!(matches!(e, SourceError::NotTabular(_)));
        let e = JsonRowsSource::new("inline", json!({ "a": 1 }))
            .load()
            .expect_err("not array");
        assert!(matches!(e, SourceError::NotTabular(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let e = CsvFileSource::new("/nonexistent/jobsync-feed.csv")
            .load()
            .expect_err("missing file");
        assert!(matches!(e, SourceError::Io { .. }));
    }
}
