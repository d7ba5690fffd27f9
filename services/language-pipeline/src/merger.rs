//! Merge stage: folds analysis results back into the search cluster.
//!
//! Error findings become new entities in the errors index. Metrics records are
//! partial updates of the documents they were computed from.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::document::{batch_lines, AnalysisResult, ErrorFinding, MetricsRecord, FIELD_ID};
use crate::error::{PipelineError, Result};
use crate::hydrator::IndexationReport;
use crate::keys::ResultStage;
use crate::search::{BulkAction, SearchIndex};
use crate::storage::ObjectStore;

/// Parse a results batch; `stage` decides the variant of every line
pub fn parse_results(stage: ResultStage, contents: &str) -> Result<Vec<AnalysisResult>> {
    batch_lines(contents)
        .map(|(line, raw)| {
            let mut body = match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(body)) => body,
                _ => {
                    return Err(PipelineError::InvalidResult {
                        line,
                        reason: "not a JSON object".to_string(),
                    })
                }
            };
            let id = take_id(&mut body).ok_or_else(|| PipelineError::InvalidResult {
                line,
                reason: "missing string id".to_string(),
            })?;

            Ok(match stage {
                ResultStage::Errors => AnalysisResult::Error(ErrorFinding { id, body }),
                ResultStage::Metrics => AnalysisResult::Metrics(MetricsRecord { id, metrics: body }),
            })
        })
        .collect()
}

fn take_id(body: &mut Map<String, Value>) -> Option<String> {
    match body.remove(FIELD_ID) {
        Some(Value::String(id)) => Some(id),
        _ => None,
    }
}

/// Bulk actions merging results into the cluster
#[derive(Debug, Clone)]
pub struct MergeTargets {
    pub documents_index: String,
    pub errors_index: String,
}

impl MergeTargets {
    pub fn actions(&self, results: Vec<AnalysisResult>) -> Result<Vec<BulkAction>> {
        results
            .into_iter()
            .map(|result| {
                Ok(match result {
                    AnalysisResult::Error(finding) => BulkAction::Index {
                        index: self.errors_index.clone(),
                        id: finding.id.clone(),
                        document: serde_json::to_value(&finding)?,
                    },
                    AnalysisResult::Metrics(record) => BulkAction::Update {
                        index: self.documents_index.clone(),
                        id: record.id.clone(),
                        doc: serde_json::to_value(&record)?,
                    },
                })
            })
            .collect()
    }
}

pub struct Merger {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchIndex>,
    targets: MergeTargets,
}

impl Merger {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchIndex>,
        targets: MergeTargets,
    ) -> Self {
        Self {
            store,
            search,
            targets,
        }
    }

    /// Merge the results batch at `bucket/key`
    #[instrument(skip(self), fields(stage = %ResultStage::from_result_key(key)))]
    pub async fn run(&self, bucket: &str, key: &str) -> Result<IndexationReport> {
        let stage = ResultStage::from_result_key(key);
        let contents = self.store.get_text(bucket, key).await?;
        let results = parse_results(stage, &contents)?;
        let actions = self.targets.actions(results)?;

        let summary = self.search.bulk(actions).await?;
        if !summary.is_success() {
            error!(
                applied = summary.applied,
                failed = summary.failures.len(),
                "Bulk merge partially failed"
            );
        }
        let indexed_count = summary.into_result()?;

        info!(indexed_count, "Analysis results merged");
        Ok(IndexationReport { indexed_count })
    }
}
