//! Document and analysis-result models, plus the newline-delimited JSON
//! batch encoding shared by every stage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;

use crate::error::Result;

pub const FIELD_COUNTRY_CODE: &str = "country-code";
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_DATE: &str = "date";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_ID: &str = "id";
pub const FIELD_SOURCE: &str = "source";

/// Fields every uploaded document must carry, in validation order
pub const REQUIRED_FIELDS: [&str; 4] = [FIELD_COUNTRY_CODE, FIELD_COUNTRY, FIELD_DATE, FIELD_TEXT];

/// Format the `date` field must match
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A text document as uploaded, optionally hydrated with `id` and `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "country-code")]
    pub country_code: String,
    pub country: String,
    pub date: String,
    pub text: String,
    /// Unique identifier, assigned during hydration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provenance label taken from the batch folder, assigned during hydration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Any additional fields present on upload, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A language error found by the errors job; inserted as a new entity.
///
/// Besides `id`, the job emits `document-id`, the inherited `country`,
/// `country-code`, `date` and `source`, and rule details (`rule-id`,
/// `category`, `type`, `context`, `replacement`). Those are carried in `body`
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFinding {
    pub id: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ErrorFinding {
    pub fn document_id(&self) -> Option<&str> {
        self.body.get("document-id").and_then(Value::as_str)
    }
}

/// Lexical metrics for one document; merged into the document with the same `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub id: String,
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

/// One line of an analysis results batch.
///
/// The variant is decided by the stage folder in the batch key, not by the
/// shape of the record.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Error(ErrorFinding),
    Metrics(MetricsRecord),
}

impl AnalysisResult {
    pub fn id(&self) -> &str {
        match self {
            AnalysisResult::Error(finding) => &finding.id,
            AnalysisResult::Metrics(record) => &record.id,
        }
    }
}

/// Iterate over the lines of a batch with their 1-based line numbers.
///
/// Lines are split on `\n` only, so a trailing newline yields a final empty
/// line. A `\r` left at the end of a line is JSON whitespace and parses.
pub fn batch_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .split('\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line))
}

/// Serialize items as newline-delimited JSON with non-ASCII characters escaped
pub fn to_ndjson<T: Serialize>(items: &[T]) -> Result<String> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        lines.push(escape_non_ascii(&serde_json::to_string(item)?));
    }
    Ok(lines.join("\n"))
}

/// Replace every non-ASCII character with its `\uXXXX` escape.
///
/// Only valid on serialized JSON, where such characters can only appear inside
/// string literals.
pub fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }

    let mut out = String::with_capacity(json.len() + 16);
    let mut units = [0u16; 2];
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}
