//! Object key conventions.
//!
//! Uploaded batches live at `<source>/.../<file>`. Analysis jobs write their
//! results next to the original path with a stage folder inserted right
//! before the file name: `<source>/.../<stage>/<file>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const KEY_SEPARATOR: char = '/';

/// Analysis stage whose results a batch holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStage {
    Errors,
    Metrics,
}

impl ResultStage {
    pub const ALL: [ResultStage; 2] = [ResultStage::Errors, ResultStage::Metrics];

    /// Folder name inserted into result keys
    pub fn folder_name(&self) -> &'static str {
        match self {
            ResultStage::Errors => "errors",
            ResultStage::Metrics => "metrics",
        }
    }

    /// Stage of a results key: any key with an `errors` folder segment holds
    /// error findings, everything else holds metrics.
    pub fn from_result_key(key: &str) -> Self {
        let marker = format!(
            "{sep}{}{sep}",
            ResultStage::Errors.folder_name(),
            sep = KEY_SEPARATOR
        );
        if key.contains(&marker) {
            ResultStage::Errors
        } else {
            ResultStage::Metrics
        }
    }
}

impl fmt::Display for ResultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

impl FromStr for ResultStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "errors" => Ok(ResultStage::Errors),
            "metrics" => Ok(ResultStage::Metrics),
            other => Err(format!("unknown analysis stage: {other}")),
        }
    }
}

/// Whether the key places the object inside at least one folder
pub fn is_inside_folder(key: &str) -> bool {
    key.contains(KEY_SEPARATOR)
}

/// First path segment of a key, used as the data source name
pub fn source_folder(key: &str) -> &str {
    key.split(KEY_SEPARATOR).next().unwrap_or(key)
}

/// Last path segment of a key
pub fn file_name(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}

/// Insert the stage folder immediately before the file name.
///
/// `acme/2024/file.jsonl` becomes `acme/2024/metrics/file.jsonl`.
pub fn derive_result_key(key: &str, stage: ResultStage) -> String {
    match key.rsplit_once(KEY_SEPARATOR) {
        Some((dir, file)) => format!(
            "{dir}{sep}{}{sep}{file}",
            stage.folder_name(),
            sep = KEY_SEPARATOR
        ),
        None => format!("{}{}{key}", stage.folder_name(), KEY_SEPARATOR),
    }
}

/// Inverse of [`derive_result_key`]: remove the stage folder sitting right
/// before the file name. Returns `None` when the key has no such folder.
pub fn original_key(result_key: &str, stage: ResultStage) -> Option<String> {
    let (dir, file) = result_key.rsplit_once(KEY_SEPARATOR)?;

    if dir == stage.folder_name() {
        return Some(file.to_string());
    }

    let (parent, folder) = dir.rsplit_once(KEY_SEPARATOR)?;
    if folder == stage.folder_name() {
        Some(format!("{parent}{KEY_SEPARATOR}{file}"))
    } else {
        None
    }
}
