//! Data structures flowing through a fetch cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// One field-keyed observation. Values stay strings until extraction.
pub type Row = BTreeMap<String, String>;

/// Rows of every record a source produced, keyed by record id.
pub type Records = BTreeMap<String, Vec<Row>>;

/// How one named sub-table is carved out of a source's raw output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    /// Record id monitors refer to
    pub id: String,
    /// Field names in positional order
    pub header: Vec<String>,
    /// Drop the first produced row
    pub first_row_is_header: bool,
    /// Parser specific options (`separator`, `format`, `path`)
    pub options: BTreeMap<String, String>,
}

impl RecordSpec {
    /// Create a record spec without options.
    pub fn new(id: impl Into<String>, header: &[&str]) -> Self {
        Self {
            id: id.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
            first_row_is_header: false,
            options: BTreeMap::new(),
        }
    }

    /// Mark the first produced row as a header row.
    pub fn with_header_row(mut self, first_row_is_header: bool) -> Self {
        self.first_row_is_header = first_row_is_header;
        self
    }

    /// Set a parser option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// The joined result of one fetch cycle across all sources.
///
/// The capture time marks when the cycle started, not when its slowest
/// source finished.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    started: Instant,
    captured_at: DateTime<Utc>,
    sources: BTreeMap<String, Records>,
}

impl Snapshot {
    pub fn new(started: Instant, captured_at: DateTime<Utc>, sources: BTreeMap<String, Records>) -> Self {
        Self {
            started,
            captured_at,
            sources,
        }
    }

    /// Monotonic instant the cycle started at.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Wall-clock time the cycle started at.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Records of one source, if it fetched successfully.
    pub fn source(&self, source_id: &str) -> Option<&Records> {
        self.sources.get(source_id)
    }

    /// Rows of one record of one source.
    pub fn rows(&self, source_id: &str, record_id: &str) -> Option<&[Row]> {
        self.source(source_id)?.get(record_id).map(Vec::as_slice)
    }

    /// Ids of the sources contributing to this snapshot.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
