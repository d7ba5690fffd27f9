//! Error types shared by every pipeline stage.
//!
//! Each variant carries enough context to build the operator-facing message
//! and maps onto an HTTP-style status code that the workflow layer reports.

use std::fmt;
use thiserror::Error;

use crate::document::REQUIRED_FIELDS;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Reason a batch failed the size check
#[derive(Debug, Clone, PartialEq)]
pub enum SizeViolation {
    Empty,
    TooLarge { size_bytes: u64, max_bytes: u64 },
}

/// Reason a required field failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldViolation {
    Missing,
    /// Field holds a non-string JSON value; carries the JSON type name
    WrongType(&'static str),
    Empty,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldViolation::Missing => write!(f, "missing"),
            FieldViolation::WrongType(found) => write!(f, "wrong type ({found})"),
            FieldViolation::Empty => write!(f, "empty"),
        }
    }
}

/// Errors raised by the validation, indexation and merge stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("All data source files must be inside a folder with the name of the data source.")]
    Structure,

    #[error("{}", size_message(.file_name, .violation))]
    Size {
        file_name: String,
        violation: SizeViolation,
    },

    #[error(
        "Invalid document at line {line}. Data source files must contain one JSON object per line with the fields {}",
        REQUIRED_FIELDS.join(", ")
    )]
    Format { line: usize },

    #[error("{}", field_message(.line, .field, .violation))]
    Field {
        line: usize,
        field: &'static str,
        violation: FieldViolation,
    },

    #[error("Invalid document at line {line}. Field {field} does not match format {format}.")]
    DateFormat {
        line: usize,
        field: &'static str,
        format: &'static str,
    },

    #[error("Invalid analysis result at line {line}: {reason}")]
    InvalidResult { line: usize, reason: String },

    #[error("{details}")]
    Indexation { details: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Search cluster error: {0}")]
    Search(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn size_message(file_name: &str, violation: &SizeViolation) -> String {
    match violation {
        SizeViolation::Empty => format!("The data source file {file_name} is empty."),
        SizeViolation::TooLarge {
            size_bytes,
            max_bytes,
        } => format!(
            "The size of data source file {file_name} ({} MB) exceeds the maximum allowed size of {} MB.",
            *size_bytes as f64 / 1_000_000.0,
            *max_bytes as f64 / 1_000_000.0
        ),
    }
}

fn field_message(line: &usize, field: &str, violation: &FieldViolation) -> String {
    match violation {
        FieldViolation::Missing => {
            format!("Invalid document at line {line}. Missing {field} field.")
        }
        FieldViolation::WrongType(found) => format!(
            "Invalid document at line {line}. Field {field} must be a string ({found} found)."
        ),
        FieldViolation::Empty => format!("Invalid document at line {line}. Field {field} is empty."),
    }
}

impl PipelineError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// HTTP-style status reported to the workflow layer
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Structure => 422,
            PipelineError::Size { violation, .. } => match violation {
                SizeViolation::Empty => 400,
                SizeViolation::TooLarge { .. } => 413,
            },
            PipelineError::Format { .. } => 400,
            PipelineError::Field { violation, .. } => match violation {
                FieldViolation::Missing => 400,
                FieldViolation::WrongType(_) | FieldViolation::Empty => 422,
            },
            PipelineError::DateFormat { .. } => 422,
            PipelineError::InvalidResult { .. } => 400,
            PipelineError::Indexation { .. } => 400,
            PipelineError::Storage(_) | PipelineError::Search(_) => 502,
            PipelineError::Serialization(_) => 500,
        }
    }

    /// Stable error type name, used as `errorType` in stage responses
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Structure => "StructureError",
            PipelineError::Size { .. } => "SizeError",
            PipelineError::Format { .. } => "FormatError",
            PipelineError::Field { .. } => "FieldError",
            PipelineError::DateFormat { .. } => "DateFormatError",
            PipelineError::InvalidResult { .. } => "InvalidResultError",
            PipelineError::Indexation { .. } => "IndexationError",
            PipelineError::Storage(_) => "StorageError",
            PipelineError::Search(_) => "SearchError",
            PipelineError::Serialization(_) => "SerializationError",
        }
    }

    /// Whether the failure came from batch validation and warrants quarantine
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::Structure
                | PipelineError::Size { .. }
                | PipelineError::Format { .. }
                | PipelineError::Field { .. }
                | PipelineError::DateFormat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PipelineError::Structure.status(), 422);
        assert_eq!(
            PipelineError::Size {
                file_name: "a.jsonl".into(),
                violation: SizeViolation::Empty
            }
            .status(),
            400
        );
        assert_eq!(
            PipelineError::Size {
                file_name: "a.jsonl".into(),
                violation: SizeViolation::TooLarge {
                    size_bytes: 60_000_000,
                    max_bytes: 50_000_000
                }
            }
            .status(),
            413
        );
        assert_eq!(
            PipelineError::Indexation {
                details: "[]".into()
            }
            .status(),
            400
        );
        assert_eq!(PipelineError::storage("boom").status(), 502);
    }

    #[test]
    fn test_messages() {
        let err = PipelineError::Field {
            line: 3,
            field: "country",
            violation: FieldViolation::WrongType("number"),
        };
        assert_eq!(
            err.to_string(),
            "Invalid document at line 3. Field country must be a string (number found)."
        );

        let err = PipelineError::Size {
            file_name: "big.jsonl".into(),
            violation: SizeViolation::TooLarge {
                size_bytes: 75_500_000,
                max_bytes: 50_000_000,
            },
        };
        assert_eq!(
            err.to_string(),
            "The size of data source file big.jsonl (75.5 MB) exceeds the maximum allowed size of 50 MB."
        );

        let err = PipelineError::Format { line: 2 };
        assert!(err.to_string().starts_with("Invalid document at line 2."));
        assert!(err.to_string().contains("country-code, country, date, text"));
    }

    #[test]
    fn test_kind_and_validation_flag() {
        let err = PipelineError::DateFormat {
            line: 1,
            field: "date",
            format: "%Y-%m-%d",
        };
        assert_eq!(err.kind(), "DateFormatError");
        assert!(err.is_validation());
        assert!(!PipelineError::search("down").is_validation());
    }
}
