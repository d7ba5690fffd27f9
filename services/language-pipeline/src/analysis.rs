//! Interface to the external language analysis jobs.
//!
//! The jobs themselves (grammar checking and lexical metrics) run outside this
//! service. What lives here is the description of a job submission, the
//! language/mode to model lookup table and the foreignism list the metrics job
//! consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::config::{Config, ConfigValidationError};
use crate::error::Result;
use crate::keys::{derive_result_key, ResultStage};
use crate::storage::ObjectStore;

/// Object holding the foreignism list in the config-files bucket
pub const FOREIGNISMS_FILE_NAME: &str = "foreignisms.txt";

/// Trade-off between model size and accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalysisMode {
    #[default]
    Efficiency,
    Accuracy,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Efficiency => f.write_str("Efficiency"),
            AnalysisMode::Accuracy => f.write_str("Accuracy"),
        }
    }
}

/// Model identifiers for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNames {
    pub efficiency: String,
    pub accuracy: String,
}

impl ModelNames {
    fn new(efficiency: &str, accuracy: &str) -> Self {
        Self {
            efficiency: efficiency.to_string(),
            accuracy: accuracy.to_string(),
        }
    }

    pub fn for_mode(&self, mode: AnalysisMode) -> &str {
        match mode {
            AnalysisMode::Efficiency => &self.efficiency,
            AnalysisMode::Accuracy => &self.accuracy,
        }
    }
}

/// Language code -> model lookup used by the metrics job
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    models: HashMap<String, ModelNames>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let table = [
            ("ca", "ca_core_news_sm", "ca_core_news_trf"),
            ("zh", "zh_core_web_sm", "zh_core_web_trf"),
            ("da", "da_core_news_sm", "da_core_news_trf"),
            ("nl", "nl_core_news_sm", "nl_core_news_lg"),
            ("en", "en_core_web_sm", "en_core_web_trf"),
            ("fr", "fr_core_news_sm", "fr_dep_news_trf"),
            ("de", "de_core_news_sm", "de_dep_news_trf"),
            ("el", "el_core_news_sm", "el_core_news_lg"),
            ("it", "it_core_news_sm", "it_core_news_lg"),
            ("ja", "ja_core_news_sm", "ja_core_news_trf"),
            ("lt", "lt_core_news_sm", "lt_core_news_lg"),
            ("mk", "mk_core_news_sm", "mk_core_news_lg"),
            ("xx", "xx_ent_wiki_sm", "xx_sent_ud_sm"),
            ("nb", "nb_core_news_sm", "nb_core_news_lg"),
            ("pl", "pl_core_news_sm", "pl_core_news_lg"),
            ("pt", "pt_core_news_sm", "pt_core_news_lg"),
            ("ro", "ro_core_news_sm", "ro_core_news_lg"),
            ("ru", "ru_core_news_sm", "ru_core_news_lg"),
            ("es", "es_core_news_sm", "es_dep_news_trf"),
        ];

        Self {
            models: table
                .into_iter()
                .map(|(lang, efficiency, accuracy)| {
                    (lang.to_string(), ModelNames::new(efficiency, accuracy))
                })
                .collect(),
        }
    }
}

impl ModelCatalog {
    /// Add or replace entries
    pub fn with_overrides(mut self, overrides: HashMap<String, ModelNames>) -> Self {
        self.models.extend(overrides);
        self
    }

    pub fn model_for(&self, language: &str, mode: AnalysisMode) -> Option<&str> {
        self.models.get(language).map(|names| names.for_mode(mode))
    }

    /// Supported language codes, sorted
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.models.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}

/// Everything an analysis job needs to process one hydrated batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJobRequest {
    pub stage: ResultStage,
    pub input_bucket: String,
    pub input_key: String,
    pub results_bucket: String,
    pub results_key: String,
    pub language: String,
    /// Model the job loads; the grammar checker is addressed by language code
    pub model: String,
    /// Location of the foreignism list (metrics job only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreignisms: Option<ObjectLocation>,
}

/// Bucket/key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

/// Builds the job submissions for a freshly indexed batch
#[derive(Debug, Clone)]
pub struct JobPlanner {
    results_bucket: String,
    config_files_bucket: String,
    language: String,
    metrics_model: String,
}

impl JobPlanner {
    pub fn new(config: &Config) -> std::result::Result<Self, ConfigValidationError> {
        let catalog = config.analysis.catalog();
        let metrics_model = catalog
            .model_for(&config.analysis.language, config.analysis.mode)
            .ok_or_else(|| ConfigValidationError::InvalidValue {
                field: "analysis.language".to_string(),
                message: format!(
                    "no {} model known for language '{}'",
                    config.analysis.mode, config.analysis.language
                ),
            })?
            .to_string();

        Ok(Self {
            results_bucket: config.storage.results_bucket.clone(),
            config_files_bucket: config.storage.config_files_bucket.clone(),
            language: config.analysis.language.clone(),
            metrics_model,
        })
    }

    /// One request per analysis stage for the batch at `bucket/key`
    pub fn plan(&self, bucket: &str, key: &str) -> Vec<AnalysisJobRequest> {
        ResultStage::ALL
            .into_iter()
            .map(|stage| {
                let (model, foreignisms) = match stage {
                    ResultStage::Errors => (self.language.clone(), None),
                    ResultStage::Metrics => (
                        self.metrics_model.clone(),
                        Some(ObjectLocation {
                            bucket: self.config_files_bucket.clone(),
                            key: FOREIGNISMS_FILE_NAME.to_string(),
                        }),
                    ),
                };

                AnalysisJobRequest {
                    stage,
                    input_bucket: bucket.to_string(),
                    input_key: key.to_string(),
                    results_bucket: self.results_bucket.clone(),
                    results_key: derive_result_key(key, stage),
                    language: self.language.clone(),
                    model,
                    foreignisms,
                }
            })
            .collect()
    }
}

/// Foreign loanwords the metrics job looks for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Foreignisms {
    terms: Vec<String>,
}

impl Foreignisms {
    /// One term per line; surrounding whitespace trimmed, blank lines skipped
    pub fn parse(contents: &str) -> Self {
        Self {
            terms: contents
                .lines()
                .map(|line| line.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
        }
    }

    /// Fetch and parse the list from the config-files bucket
    pub async fn load(store: &dyn ObjectStore, bucket: &str) -> Result<Self> {
        let contents = store.get_text(bucket, FOREIGNISMS_FILE_NAME).await?;
        let foreignisms = Self::parse(&contents);
        debug!(bucket = %bucket, terms = foreignisms.len(), "Loaded foreignisms");
        Ok(foreignisms)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Every whole-word occurrence of a term in `text`, repeated per hit.
    ///
    /// Punctuation other than `-`, digits, `¿` and `¡` count as word breaks.
    pub fn occurrences(&self, text: &str) -> Vec<&str> {
        let normalized = normalize_for_matching(text);
        let mut found = Vec::new();

        for term in &self.terms {
            let needle = format!(" {term} ");
            let hits = normalized.matches(needle.as_str()).count();
            found.extend(std::iter::repeat(term.as_str()).take(hits));
        }

        found
    }
}

fn normalize_for_matching(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 2);
    normalized.push(' ');
    for c in text.to_lowercase().chars() {
        let is_break = (c.is_ascii_punctuation() && c != '-')
            || c.is_ascii_digit()
            || c == '¿'
            || c == '¡';
        normalized.push(if is_break { ' ' } else { c });
    }
    normalized.push(' ');
    normalized
}
