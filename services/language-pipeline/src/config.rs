use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::analysis::{AnalysisMode, ModelCatalog, ModelNames};

/// Main configuration for the pipeline stages
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Search cluster configuration
    pub search: SearchConfig,
    /// Batch validation limits
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Language analysis settings
    pub analysis: AnalysisConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON formatted logs
    #[serde(default = "default_true")]
    pub json_logs: bool,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Bucket receiving batches that failed validation
    pub quarantine_bucket: String,
    /// Bucket receiving hydrated batches after indexation
    pub indexed_bucket: String,
    /// Bucket the analysis jobs write their results to
    pub results_bucket: String,
    /// Bucket holding auxiliary files such as the foreignisms list
    pub config_files_bucket: String,
}

/// Search cluster configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Cluster endpoint, with or without scheme
    pub endpoint: String,
    /// Index holding the documents
    #[serde(default = "default_documents_index")]
    pub documents_index: String,
    /// Index holding the language error findings
    #[serde(default = "default_errors_index")]
    pub errors_index: String,
    /// Sign requests with SigV4 using the ambient AWS credentials
    #[serde(default = "default_true")]
    pub sign_requests: bool,
    /// Request timeout in seconds
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

/// Batch validation limits
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Largest accepted batch in bytes (decimal megabytes, 50 MB default)
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
}

/// Language analysis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Language code of the analysed documents
    pub language: String,
    /// Model size/accuracy trade-off
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Extra or overriding language -> model entries
    #[serde(default)]
    pub models: HashMap<String, ModelNames>,
}

impl SearchConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AnalysisConfig {
    /// Built-in model table extended with the configured overrides
    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::default().with_overrides(self.models.clone())
    }
}

// Default value functions
fn default_service_name() -> String {
    "language-pipeline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_documents_index() -> String {
    "documents".to_string()
}

fn default_errors_index() -> String {
    "language-errors".to_string()
}

fn default_search_timeout_secs() -> u64 {
    30
}

fn default_max_batch_bytes() -> u64 {
    50 * 1_000_000 // 50MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "language-pipeline")?
            .set_default("service.log_level", "info")?
            // Add config file if present
            .add_source(config::File::with_name("config/pipeline").required(false))
            .add_source(config::File::with_name("/etc/language-pipeline/pipeline").required(false))
            // Override with environment variables
            // PIPELINE__STORAGE__QUARANTINE_BUCKET -> storage.quarantine_bucket
            .add_source(
                config::Environment::with_prefix("PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the loaded configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let buckets = [
            ("storage.quarantine_bucket", &self.storage.quarantine_bucket),
            ("storage.indexed_bucket", &self.storage.indexed_bucket),
            ("storage.results_bucket", &self.storage.results_bucket),
            ("storage.config_files_bucket", &self.storage.config_files_bucket),
        ];
        for (field, value) in buckets {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::MissingField(field.to_string()));
            }
        }

        if self.search.endpoint.trim().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "search.endpoint".to_string(),
            ));
        }

        if self.validation.max_batch_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "validation.max_batch_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self
            .analysis
            .catalog()
            .model_for(&self.analysis.language, self.analysis.mode)
            .is_none()
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "analysis.language".to_string(),
                message: format!(
                    "no {} model known for language '{}'",
                    self.analysis.mode, self.analysis.language
                ),
            });
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            json_logs: default_true(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            storage: StorageConfig {
                region: "eu-west-1".to_string(),
                endpoint_url: None,
                force_path_style: false,
                quarantine_bucket: "invalid-data-sources".to_string(),
                indexed_bucket: "indexed-data-sources".to_string(),
                results_bucket: "analysis-results".to_string(),
                config_files_bucket: "config-files".to_string(),
            },
            search: SearchConfig {
                endpoint: "search-language-analysis.eu-west-1.es.amazonaws.com".to_string(),
                documents_index: default_documents_index(),
                errors_index: default_errors_index(),
                sign_requests: true,
                timeout_secs: 30,
            },
            validation: ValidationConfig::default(),
            analysis: AnalysisConfig {
                language: "en".to_string(),
                mode: AnalysisMode::Efficiency,
                models: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_batch_bytes(), 50_000_000);
        assert_eq!(default_documents_index(), "documents");
        assert_eq!(default_errors_index(), "language-errors");
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_bucket() {
        let mut config = create_test_config();
        config.storage.quarantine_bucket = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(field)) if field == "storage.quarantine_bucket"
        ));
    }

    #[test]
    fn test_missing_endpoint() {
        let mut config = create_test_config();
        config.search.endpoint = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_unknown_language() {
        let mut config = create_test_config();
        config.analysis.language = "tlh".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_language_added_through_overrides() {
        let mut config = create_test_config();
        config.analysis.language = "sv".to_string();
        config.analysis.models.insert(
            "sv".to_string(),
            ModelNames {
                efficiency: "sv_core_news_sm".to_string(),
                accuracy: "sv_core_news_lg".to_string(),
            },
        );
        assert!(config.validate().is_ok());
    }
}
