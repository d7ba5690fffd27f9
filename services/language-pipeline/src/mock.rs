//! In-memory collaborators for tests and local runs.
//!
//! `MemoryObjectStore` keeps objects in a bucket/key map and
//! `MemorySearchIndex` applies bulk actions to per-index document maps with
//! the cluster's semantics: `index` replaces, `update` merges top-level fields
//! and fails with 404 when the document does not exist.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MemoryObjectStore::new());
//! store.insert("data-sources", "acme/2024-01-01.jsonl", batch);
//!
//! let search = Arc::new(MemorySearchIndex::new());
//! let hydrator = Hydrator::new(store.clone(), search.clone(), "documents", "indexed");
//! hydrator.run("data-sources", "acme/2024-01-01.jsonl").await?;
//! assert_eq!(search.documents("documents").len(), 1);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{PipelineError, Result};
use crate::search::{BulkAction, BulkSummary, SearchIndex};
use crate::storage::ObjectStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object store backed by a map of `(bucket, key)` to contents
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, contents: impl Into<String>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), contents.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<String> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.get(bucket, key).is_some()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_text(&self, bucket: &str, key: &str) -> Result<String> {
        self.get(bucket, key)
            .ok_or_else(|| PipelineError::storage(format!("NoSuchKey: {bucket}/{key}")))
    }

    async fn put_text(&self, bucket: &str, key: &str, contents: &str) -> Result<()> {
        self.insert(bucket, key, contents);
        Ok(())
    }

    async fn copy(&self, source_bucket: &str, key: &str, destination_bucket: &str) -> Result<()> {
        let contents = self.get_text(source_bucket, key).await?;
        self.insert(destination_bucket, key, contents);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Search index keeping documents per index and recording every bulk request
#[derive(Default)]
pub struct MemorySearchIndex {
    indices: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    requests: Mutex<Vec<Vec<BulkAction>>>,
    rejected_ids: Mutex<HashSet<String>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every action targeting `id` fail with a 400 item error
    pub fn reject_id(&self, id: impl Into<String>) {
        lock(&self.rejected_ids).insert(id.into());
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        lock(&self.indices)
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// All documents of an index, sorted by id
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        lock(&self.indices)
            .get(index)
            .map(|docs| docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default()
    }

    /// Bulk requests received so far, in order
    pub fn requests(&self) -> Vec<Vec<BulkAction>> {
        lock(&self.requests).clone()
    }

    fn apply(&self, action: &BulkAction) -> std::result::Result<u16, Value> {
        if lock(&self.rejected_ids).contains(action.id()) {
            return Err(json!({"type": "mapper_parsing_exception", "reason": "rejected"}));
        }

        let mut indices = lock(&self.indices);
        let docs = indices.entry(action.index().to_string()).or_default();

        match action {
            BulkAction::Index { id, document, .. } => {
                let status = if docs.contains_key(id) { 200 } else { 201 };
                docs.insert(id.clone(), document.clone());
                Ok(status)
            }
            BulkAction::Update { id, doc, .. } => match docs.get_mut(id) {
                Some(Value::Object(existing)) => {
                    if let Value::Object(fields) = doc {
                        for (field, value) in fields {
                            existing.insert(field.clone(), value.clone());
                        }
                    }
                    Ok(200)
                }
                _ => Err(json!({
                    "type": "document_missing_exception",
                    "reason": format!("[{id}]: document missing")
                })),
            },
        }
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkSummary> {
        let mut summary = BulkSummary::default();

        for action in &actions {
            match self.apply(action) {
                Ok(_) => summary.applied += 1,
                Err(error) => {
                    let status = if error["type"] == "document_missing_exception" {
                        404
                    } else {
                        400
                    };
                    let mut item = Map::new();
                    item.insert(
                        action.op_type().to_string(),
                        json!({
                            "_index": action.index(),
                            "_id": action.id(),
                            "status": status,
                            "error": error
                        }),
                    );
                    summary.failures.push(Value::Object(item));
                }
            }
        }

        lock(&self.requests).push(actions);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_store_copy_and_delete() {
        let store = MemoryObjectStore::new();
        store.insert("src", "acme/a.jsonl", "{}");

        store.copy("src", "acme/a.jsonl", "dst").await.unwrap();
        store.delete("src", "acme/a.jsonl").await.unwrap();

        assert!(!store.contains("src", "acme/a.jsonl"));
        assert_eq!(store.get("dst", "acme/a.jsonl").as_deref(), Some("{}"));
        assert!(store.get_text("src", "acme/a.jsonl").await.is_err());
    }

    #[tokio::test]
    async fn test_update_of_missing_document_fails() {
        let search = MemorySearchIndex::new();
        let summary = search
            .bulk(vec![BulkAction::Update {
                index: "documents".to_string(),
                id: "ghost".to_string(),
                doc: json!({"ttr": 1.0}),
            }])
            .await
            .unwrap();

        assert_eq!(summary.applied, 0);
        assert_eq!(summary.failures[0]["update"]["status"], 404);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let search = MemorySearchIndex::new();
        search
            .bulk(vec![
                BulkAction::Index {
                    index: "documents".to_string(),
                    id: "d".to_string(),
                    document: json!({"id": "d", "text": "hi"}),
                },
                BulkAction::Update {
                    index: "documents".to_string(),
                    id: "d".to_string(),
                    doc: json!({"id": "d", "ttr": 1.0}),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            search.document("documents", "d"),
            Some(json!({"id": "d", "text": "hi", "ttr": 1.0}))
        );
        assert_eq!(search.requests().len(), 1);
    }
}
