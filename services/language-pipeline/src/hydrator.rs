//! Indexation stage: hydrates a validated batch with ids and provenance,
//! indexes every document and republishes the hydrated batch.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::document::{batch_lines, to_ndjson, Record, FIELD_ID, FIELD_SOURCE};
use crate::error::{PipelineError, Result};
use crate::keys::source_folder;
use crate::search::{BulkAction, SearchIndex};
use crate::storage::ObjectStore;

/// Stage response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexationReport {
    pub indexed_count: usize,
}

/// Parse a batch and give every record a fresh id and the batch's source.
///
/// Whatever `id` or `source` a document arrives with is replaced.
pub fn hydrate(key: &str, contents: &str) -> Result<Vec<Record>> {
    let source = source_folder(key);

    batch_lines(contents)
        .map(|(line, raw)| {
            let mut document = match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(document)) => document,
                _ => return Err(PipelineError::Format { line }),
            };
            document.insert(
                FIELD_ID.to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
            document.insert(FIELD_SOURCE.to_string(), Value::String(source.to_string()));

            serde_json::from_value(Value::Object(document))
                .map_err(|_| PipelineError::Format { line })
        })
        .collect()
}

/// Upsert-by-id actions for hydrated records
pub fn index_actions(index: &str, records: &[Record]) -> Result<Vec<BulkAction>> {
    records
        .iter()
        .map(|record| {
            Ok(BulkAction::Index {
                index: index.to_string(),
                id: record.id.clone().unwrap_or_default(),
                document: serde_json::to_value(record)?,
            })
        })
        .collect()
}

pub struct Hydrator {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchIndex>,
    documents_index: String,
    indexed_bucket: String,
}

impl Hydrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchIndex>,
        documents_index: impl Into<String>,
        indexed_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            search,
            documents_index: documents_index.into(),
            indexed_bucket: indexed_bucket.into(),
        }
    }

    /// Hydrate and index the batch at `bucket/key`.
    ///
    /// Documents that were indexed before a partial bulk failure stay indexed
    /// and the hydrated batch is not written.
    #[instrument(skip(self))]
    pub async fn run(&self, bucket: &str, key: &str) -> Result<IndexationReport> {
        let contents = self.store.get_text(bucket, key).await?;
        let records = hydrate(key, &contents)?;
        let actions = index_actions(&self.documents_index, &records)?;

        let summary = self.search.bulk(actions).await?;
        if !summary.is_success() {
            error!(
                applied = summary.applied,
                failed = summary.failures.len(),
                "Bulk indexation partially failed"
            );
        }
        let indexed_count = summary.into_result()?;

        self.store
            .put_text(&self.indexed_bucket, key, &to_ndjson(&records)?)
            .await?;

        info!(
            indexed_count,
            index = %self.documents_index,
            indexed_bucket = %self.indexed_bucket,
            "Documents indexed"
        );

        Ok(IndexationReport { indexed_count })
    }
}
