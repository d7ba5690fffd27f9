//! Search cluster access.
//!
//! Stages talk to the cluster exclusively through bulk requests. The
//! `SearchIndex` trait keeps the stages independent of the transport so they
//! can run against an in-memory index in tests.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use opensearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    BulkOperation, BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::SearchConfig;
use crate::error::{PipelineError, Result};

/// One action of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Create or fully replace the document with this id
    Index {
        index: String,
        id: String,
        document: Value,
    },
    /// Merge `doc` into the existing document with this id
    Update { index: String, id: String, doc: Value },
}

impl BulkAction {
    pub fn id(&self) -> &str {
        match self {
            BulkAction::Index { id, .. } | BulkAction::Update { id, .. } => id,
        }
    }

    pub fn index(&self) -> &str {
        match self {
            BulkAction::Index { index, .. } | BulkAction::Update { index, .. } => index,
        }
    }

    pub fn op_type(&self) -> &'static str {
        match self {
            BulkAction::Index { .. } => "index",
            BulkAction::Update { .. } => "update",
        }
    }
}

/// Outcome of a bulk request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkSummary {
    /// Number of actions the cluster applied
    pub applied: usize,
    /// Response items of the actions that failed, as returned by the cluster
    pub failures: Vec<Value>,
}

impl BulkSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn per-item failures into an indexation error carrying them as JSON
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.applied)
        } else {
            Err(PipelineError::Indexation {
                details: serde_json::to_string(&self.failures)?,
            })
        }
    }
}

/// Bulk access to the search cluster
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Submit all actions in a single bulk request
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkSummary>;
}

/// OpenSearch-backed search index
pub struct OpenSearchIndex {
    client: OpenSearch,
}

impl OpenSearchIndex {
    /// Create a client for the configured cluster.
    ///
    /// Requests are signed with SigV4 for the given region when
    /// `sign_requests` is enabled.
    pub async fn new(config: &SearchConfig, region: &str) -> Result<Self> {
        let url = endpoint_url(&config.endpoint)?;
        let conn_pool = SingleNodeConnectionPool::new(url.clone());
        let mut builder = TransportBuilder::new(conn_pool).timeout(config.timeout());

        if config.sign_requests {
            let aws_config: aws_types::SdkConfig = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(region.to_string()))
                .load()
                .await;

            let credentials = Credentials::try_from(aws_config)
                .map_err(|e| PipelineError::search(e.to_string()))?;
            builder = builder.auth(credentials).service_name("es");
        }

        let transport = builder
            .build()
            .map_err(|e| PipelineError::search(e.to_string()))?;

        info!(
            url = %url,
            signed = config.sign_requests,
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkSummary> {
        if actions.is_empty() {
            return Ok(BulkSummary::default());
        }

        let operations: Vec<BulkOperation<Value>> = actions
            .into_iter()
            .map(|action| match action {
                BulkAction::Index {
                    index,
                    id,
                    document,
                } => BulkOperation::index(document).id(id).index(index).into(),
                BulkAction::Update { index, id, doc } => {
                    BulkOperation::update(id, json!({ "doc": doc }))
                        .index(index)
                        .into()
                }
            })
            .collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(operations)
            .send()
            .await
            .map_err(|e| PipelineError::search(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(PipelineError::search(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::search(e.to_string()))?;

        let summary = summarize_bulk_response(&body);
        debug!(
            applied = summary.applied,
            failed = summary.failures.len(),
            "Bulk request completed"
        );
        Ok(summary)
    }
}

/// Count applied actions and collect failed items from a bulk response body
pub fn summarize_bulk_response(body: &Value) -> BulkSummary {
    let mut summary = BulkSummary::default();

    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for item in items {
        let outcome = item
            .as_object()
            .and_then(|op| op.values().next())
            .cloned()
            .unwrap_or(Value::Null);

        let status = outcome.get("status").and_then(Value::as_u64).unwrap_or(0);
        let failed = outcome.get("error").is_some() || !(200..300).contains(&status);

        if failed {
            summary.failures.push(item.clone());
        } else {
            summary.applied += 1;
        }
    }

    summary
}

/// Cluster endpoints are often configured as a bare host name; default to HTTPS
fn endpoint_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };

    Url::parse(&with_scheme)
        .map_err(|e| PipelineError::search(format!("Invalid search endpoint '{endpoint}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("search-domain.eu-west-1.es.amazonaws.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("search-domain.eu-west-1.es.amazonaws.com"));

        let url = endpoint_url("http://localhost:9200").unwrap();
        assert_eq!(url.port(), Some(9200));

        assert!(endpoint_url("http://").is_err());
    }

    #[test]
    fn test_summarize_all_successful() {
        let body = json!({
            "took": 3,
            "errors": false,
            "items": [
                {"index": {"_index": "documents", "_id": "a", "status": 201}},
                {"index": {"_index": "documents", "_id": "b", "status": 200}}
            ]
        });

        let summary = summarize_bulk_response(&body);
        assert_eq!(summary.applied, 2);
        assert!(summary.is_success());
        assert_eq!(summary.into_result().unwrap(), 2);
    }

    #[test]
    fn test_summarize_partial_failure() {
        let failed_item = json!({"update": {
            "_index": "documents",
            "_id": "missing",
            "status": 404,
            "error": {"type": "document_missing_exception", "reason": "[missing]: document missing"}
        }});
        let body = json!({
            "errors": true,
            "items": [
                {"update": {"_index": "documents", "_id": "a", "status": 200}},
                failed_item.clone()
            ]
        });

        let summary = summarize_bulk_response(&body);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.failures, vec![failed_item.clone()]);

        match summary.into_result() {
            Err(PipelineError::Indexation { details }) => {
                let parsed: Vec<Value> = serde_json::from_str(&details).unwrap();
                assert_eq!(parsed, vec![failed_item]);
            }
            other => panic!("expected indexation error, got {other:?}"),
        }
    }

    #[test]
    fn test_summarize_without_items() {
        let summary = summarize_bulk_response(&json!({"errors": false}));
        assert_eq!(summary, BulkSummary::default());
    }

    #[test]
    fn test_bulk_action_accessors() {
        let action = BulkAction::Update {
            index: "documents".to_string(),
            id: "doc-1".to_string(),
            doc: json!({"ttr": 0.5}),
        };
        assert_eq!(action.id(), "doc-1");
        assert_eq!(action.index(), "documents");
        assert_eq!(action.op_type(), "update");
    }
}
