//! Output parsers turning raw command output into records.

use crate::error::ParseError;
use crate::watch::data::{RecordSpec, Records, Row};
use crate::watch::xpath::XPath;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default field delimiter of delimited output.
pub const DEFAULT_SEPARATOR: char = ':';

/// Parsing strategies a source can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParserKind {
    #[serde(rename = "csv", alias = "delimited")]
    Delimited,
    #[serde(rename = "htmlquery", alias = "markup")]
    Markup,
}

/// Parser selected once when a source is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputParser {
    /// Rows split on newlines, fields on a single character delimiter
    Delimited,
    /// Table rows selected out of an HTML document
    Markup,
}

impl From<ParserKind> for OutputParser {
    fn from(kind: ParserKind) -> Self {
        match kind {
            ParserKind::Delimited => OutputParser::Delimited,
            ParserKind::Markup => OutputParser::Markup,
        }
    }
}

impl OutputParser {
    /// Carve every record in `specs` out of `raw`.
    pub fn parse(&self, specs: &[RecordSpec], raw: &[u8]) -> Result<Records, ParseError> {
        match self {
            OutputParser::Delimited => parse_delimited(specs, raw),
            OutputParser::Markup => parse_markup(specs, raw),
        }
    }
}

type Table = Vec<Vec<String>>;

fn parse_delimited(specs: &[RecordSpec], raw: &[u8]) -> Result<Records, ParseError> {
    let mut records = Records::new();
    for spec in specs {
        let separator = separator(spec)?;
        let table = read_table(raw, separator)?;
        debug!(record = %spec.id, rows = table.len(), "Parsing delimited data");
        records.insert(spec.id.clone(), zip(table, spec)?);
    }
    Ok(records)
}

fn separator(spec: &RecordSpec) -> Result<u8, ParseError> {
    let Some(value) = spec
        .options
        .get("separator")
        .or_else(|| spec.options.get("delimiter"))
    else {
        return Ok(DEFAULT_SEPARATOR as u8);
    };

    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ParseError::invalid_option("csv", "separator", &spec.options)),
    }
}

fn read_table(raw: &[u8], separator: u8) -> Result<Table, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(separator)
        .from_reader(raw);

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record?;
        table.push(record.iter().map(|f| f.trim_start().to_string()).collect());
    }
    Ok(table)
}

fn parse_markup(specs: &[RecordSpec], raw: &[u8]) -> Result<Records, ParseError> {
    let document = Html::parse_document(&String::from_utf8_lossy(raw));

    let mut records = Records::new();
    for spec in specs {
        match spec.options.get("format").map(String::as_str) {
            Some("table") => {}
            _ => return Err(ParseError::invalid_option("htmlquery", "format", &spec.options)),
        }
        let table = markup_table(&document, spec)?;
        records.insert(spec.id.clone(), zip(table, spec)?);
    }
    Ok(records)
}

fn markup_table(document: &Html, spec: &RecordSpec) -> Result<Table, ParseError> {
    let Some(path) = spec.options.get("path") else {
        return Err(ParseError::invalid_option("htmlquery", "path", &spec.options));
    };
    let Some(body) = find_one(document, path)? else {
        debug!(record = %spec.id, path = %path, "Path matched nothing");
        return Ok(Vec::new());
    };

    let table: Table = child_elements(body, "tr")
        .map(|tr| {
            child_elements(tr, "td")
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    debug!(record = %spec.id, rows = table.len(), "Parsing markup data");
    Ok(table)
}

/// First element at `path`: an XPath location path when it starts with `/`,
/// a CSS selector otherwise.
fn find_one<'a>(document: &'a Html, path: &str) -> Result<Option<ElementRef<'a>>, ParseError> {
    if path.starts_with('/') {
        return Ok(XPath::parse(path)?.select(document).into_iter().next());
    }
    let selector = Selector::parse(path).map_err(|e| ParseError::InvalidSelector {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(document.select(&selector).next())
}

fn child_elements<'a>(parent: ElementRef<'a>, name: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |e| e.value().name() == name)
}

/// Map positional cells onto the spec header.
fn zip(table: Table, spec: &RecordSpec) -> Result<Vec<Row>, ParseError> {
    let skip = usize::from(spec.first_row_is_header);
    table
        .into_iter()
        .enumerate()
        .skip(skip)
        .map(|(i, cells)| {
            if cells.len() < spec.header.len() {
                return Err(ParseError::MissingCells {
                    record: spec.id.clone(),
                    row: i,
                    expected: spec.header.len(),
                    found: cells.len(),
                });
            }
            Ok(spec.header.iter().cloned().zip(cells).collect())
        })
        .collect()
}
