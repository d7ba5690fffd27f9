//! Batch validation stage.
//!
//! A batch is accepted only if every check passes; the first failing check
//! rejects the whole batch, which is then moved to the quarantine bucket so the
//! same file cannot trigger the pipeline again.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::document::{batch_lines, DATE_FORMAT, FIELD_DATE, REQUIRED_FIELDS};
use crate::error::{FieldViolation, PipelineError, Result, SizeViolation};
use crate::keys::{file_name, is_inside_folder};
use crate::storage::ObjectStore;

/// Result of a successful validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub document_count: usize,
}

/// Structural and content checks on a batch, free of any I/O
#[derive(Debug, Clone)]
pub struct BatchRules {
    max_batch_bytes: u64,
}

impl BatchRules {
    pub fn new(max_batch_bytes: u64) -> Self {
        Self { max_batch_bytes }
    }

    /// The batch must sit inside a folder named after its data source
    pub fn check_key(&self, key: &str) -> Result<()> {
        if is_inside_folder(key) {
            Ok(())
        } else {
            Err(PipelineError::Structure)
        }
    }

    pub fn check_size(&self, key: &str, size_bytes: u64) -> Result<()> {
        let violation = if size_bytes == 0 {
            SizeViolation::Empty
        } else if size_bytes > self.max_batch_bytes {
            SizeViolation::TooLarge {
                size_bytes,
                max_bytes: self.max_batch_bytes,
            }
        } else {
            return Ok(());
        };

        Err(PipelineError::Size {
            file_name: file_name(key).to_string(),
            violation,
        })
    }

    /// Check every line of the batch, returning the number of documents
    pub fn check_contents(&self, contents: &str) -> Result<usize> {
        let mut count = 0;
        for (line, raw) in batch_lines(contents) {
            let document = match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(document)) => document,
                _ => return Err(PipelineError::Format { line }),
            };
            check_document(line, &document)?;
            count += 1;
        }
        Ok(count)
    }
}

fn check_document(line: usize, document: &Map<String, Value>) -> Result<()> {
    for field in REQUIRED_FIELDS {
        let violation = match document.get(field) {
            None => Some(FieldViolation::Missing),
            Some(Value::String(value)) if value.is_empty() => Some(FieldViolation::Empty),
            Some(Value::String(_)) => None,
            Some(other) => Some(FieldViolation::WrongType(json_type_name(other))),
        };

        if let Some(violation) = violation {
            return Err(PipelineError::Field {
                line,
                field,
                violation,
            });
        }
    }

    let date = document
        .get(FIELD_DATE)
        .and_then(Value::as_str)
        .unwrap_or_default();

    if NaiveDate::parse_from_str(date, DATE_FORMAT).is_err() {
        return Err(PipelineError::DateFormat {
            line,
            field: FIELD_DATE,
            format: DATE_FORMAT,
        });
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validation stage: checks an uploaded batch and quarantines it on failure
pub struct Validator {
    store: Arc<dyn ObjectStore>,
    rules: BatchRules,
    quarantine_bucket: String,
}

impl Validator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        rules: BatchRules,
        quarantine_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            rules,
            quarantine_bucket: quarantine_bucket.into(),
        }
    }

    /// Validate the batch at `bucket/key` whose upload size is `size_bytes`.
    ///
    /// On a validation failure the batch is copied to the quarantine bucket
    /// and removed from `bucket` before the error is returned.
    #[instrument(skip(self))]
    pub async fn run(&self, bucket: &str, key: &str, size_bytes: u64) -> Result<ValidationReport> {
        match self.check(bucket, key, size_bytes).await {
            Ok(document_count) => {
                info!(document_count, "Batch validated");
                Ok(ValidationReport { document_count })
            }
            Err(e) if e.is_validation() => {
                warn!(error = %e, error_type = e.kind(), "Batch rejected");
                self.quarantine(bucket, key).await.map_err(|quarantine_error| {
                    error!(
                        error = %quarantine_error,
                        validation_error = %e,
                        "Failed to quarantine rejected batch"
                    );
                    quarantine_error
                })?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn check(&self, bucket: &str, key: &str, size_bytes: u64) -> Result<usize> {
        self.rules.check_key(key)?;
        self.rules.check_size(key, size_bytes)?;

        let contents = self.store.get_text(bucket, key).await?;
        self.rules.check_contents(&contents)
    }

    async fn quarantine(&self, bucket: &str, key: &str) -> Result<()> {
        self.store.copy(bucket, key, &self.quarantine_bucket).await?;
        self.store.delete(bucket, key).await?;

        info!(
            source_bucket = %bucket,
            quarantine_bucket = %self.quarantine_bucket,
            key = %key,
            "Batch quarantined"
        );
        Ok(())
    }
}
