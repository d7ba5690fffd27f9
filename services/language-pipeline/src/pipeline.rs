//! Stage wiring and the response envelope reported to the workflow layer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::analysis::{AnalysisJobRequest, Foreignisms, JobPlanner};
use crate::config::{Config, ConfigValidationError};
use crate::error::{PipelineError, Result};
use crate::event::ObjectWriteEvent;
use crate::hydrator::Hydrator;
use crate::merger::{MergeTargets, Merger};
use crate::search::SearchIndex;
use crate::storage::ObjectStore;
use crate::validator::{BatchRules, Validator};

/// Stage a storage notification is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Index,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => f.write_str("validate"),
            Stage::Index => f.write_str("index"),
            Stage::Merge => f.write_str("merge"),
        }
    }
}

/// All stages, built from one configuration and one pair of collaborators
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    config_files_bucket: String,
    validator: Validator,
    hydrator: Hydrator,
    merger: Merger,
    planner: JobPlanner,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchIndex>,
    ) -> std::result::Result<Self, ConfigValidationError> {
        let validator = Validator::new(
            store.clone(),
            BatchRules::new(config.validation.max_batch_bytes),
            config.storage.quarantine_bucket.clone(),
        );
        let hydrator = Hydrator::new(
            store.clone(),
            search.clone(),
            config.search.documents_index.clone(),
            config.storage.indexed_bucket.clone(),
        );
        let merger = Merger::new(
            store.clone(),
            search,
            MergeTargets {
                documents_index: config.search.documents_index.clone(),
                errors_index: config.search.errors_index.clone(),
            },
        );

        Ok(Self {
            store,
            config_files_bucket: config.storage.config_files_bucket.clone(),
            validator,
            hydrator,
            merger,
            planner: JobPlanner::new(config)?,
        })
    }

    pub async fn validate(&self, bucket: &str, key: &str, size_bytes: u64) -> Result<Value> {
        let report = self.validator.run(bucket, key, size_bytes).await?;
        Ok(serde_json::to_value(report)?)
    }

    pub async fn index(&self, bucket: &str, key: &str) -> Result<Value> {
        let report = self.hydrator.run(bucket, key).await?;
        Ok(serde_json::to_value(report)?)
    }

    pub async fn merge(&self, bucket: &str, key: &str) -> Result<Value> {
        let report = self.merger.run(bucket, key).await?;
        Ok(serde_json::to_value(report)?)
    }

    /// Job submissions for a batch that has just been indexed
    pub fn plan_analysis(&self, bucket: &str, key: &str) -> Vec<AnalysisJobRequest> {
        self.planner.plan(bucket, key)
    }

    /// Foreignisms from the configured list found in `text`, one entry per hit
    pub async fn find_foreignisms(&self, text: &str) -> Result<Value> {
        let foreignisms = Foreignisms::load(self.store.as_ref(), &self.config_files_bucket).await?;
        let found = foreignisms.occurrences(text);
        Ok(json!({ "count": found.len(), "foreignisms": found }))
    }

    /// Run `stage` on the object named by a storage notification
    pub async fn handle_event(&self, stage: Stage, event: &ObjectWriteEvent) -> Result<Value> {
        info!(
            stage = %stage,
            bucket = %event.bucket(),
            key = %event.key(),
            "Handling object write event"
        );

        match stage {
            Stage::Validate => {
                self.validate(event.bucket(), event.key(), event.size_bytes())
                    .await
            }
            Stage::Index => self.index(event.bucket(), event.key()).await,
            Stage::Merge => self.merge(event.bucket(), event.key()).await,
        }
    }
}

/// Response body listing the analysis jobs for a batch
pub fn analysis_plan(planner: &JobPlanner, bucket: &str, key: &str) -> Result<Value> {
    let jobs = serde_json::to_value(planner.plan(bucket, key))?;
    Ok(json!({ "jobs": jobs }))
}

/// Outcome of one stage invocation in the shape the workflow layer expects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status_code: 200,
            body: Some(body),
            error_type: None,
            message: None,
        }
    }

    pub fn from_error(error: &PipelineError) -> Self {
        Self {
            status_code: error.status(),
            body: None,
            error_type: Some(error.kind()),
            message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<Result<Value>> for StageResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(e) => Self::from_error(&e),
        }
    }
}
