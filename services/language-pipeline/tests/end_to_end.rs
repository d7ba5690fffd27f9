use std::sync::Arc;

use language_pipeline::{
    derive_result_key, BulkAction, Config, MemoryObjectStore, MemorySearchIndex, ObjectWriteEvent,
    Pipeline, PipelineError, ResultStage, Stage, StageResponse,
};
use serde_json::{json, Value};

const SOURCES: &str = "data-sources";
const QUARANTINE: &str = "invalid-data-sources";
const INDEXED: &str = "indexed-data-sources";
const RESULTS: &str = "analysis-results";

const BATCH: &str =
    "{\"country\":\"US\",\"country-code\":\"US\",\"date\":\"2024-01-01\",\"text\":\"Hello world\"}";

fn test_config() -> Config {
    serde_json::from_value(json!({
        "storage": {
            "region": "eu-west-1",
            "quarantine_bucket": QUARANTINE,
            "indexed_bucket": INDEXED,
            "results_bucket": RESULTS,
            "config_files_bucket": "config-files"
        },
        "search": {
            "endpoint": "http://localhost:9200",
            "sign_requests": false
        },
        "analysis": {
            "language": "en"
        }
    }))
    .unwrap()
}

struct Harness {
    store: Arc<MemoryObjectStore>,
    search: Arc<MemorySearchIndex>,
    pipeline: Pipeline,
}

fn harness() -> Harness {
    let config = test_config();
    config.validate().unwrap();

    let store = Arc::new(MemoryObjectStore::new());
    let search = Arc::new(MemorySearchIndex::new());
    let pipeline = Pipeline::new(&config, store.clone(), search.clone()).unwrap();

    Harness {
        store,
        search,
        pipeline,
    }
}

fn write_event(bucket: &str, key: &str, size: usize) -> ObjectWriteEvent {
    let json = json!({
        "detail": {
            "requestParameters": {"bucketName": bucket, "key": key},
            "additionalEventData": {"bytesTransferredIn": size as f64}
        }
    });
    ObjectWriteEvent::from_json(&json.to_string()).unwrap()
}

#[tokio::test]
async fn test_batch_flows_from_upload_to_merged_metrics() {
    let h = harness();
    let key = "acme/2024-01-01.jsonl";
    h.store.insert(SOURCES, key, BATCH);

    // Validation passes without touching the batch
    let body = h
        .pipeline
        .handle_event(Stage::Validate, &write_event(SOURCES, key, BATCH.len()))
        .await
        .unwrap();
    assert_eq!(body, json!({"documentCount": 1}));
    assert!(h.store.contains(SOURCES, key));
    assert!(h.store.keys(QUARANTINE).is_empty());

    // Indexation hydrates and republishes
    let body = h.pipeline.index(SOURCES, key).await.unwrap();
    assert_eq!(body, json!({"indexedCount": 1}));

    let documents = h.search.documents("documents");
    assert_eq!(documents.len(), 1);
    let (doc_id, document) = &documents[0];
    assert!(!doc_id.is_empty());
    assert_eq!(document["source"], "acme");
    assert_eq!(document["id"], doc_id.as_str());

    let hydrated: Value = serde_json::from_str(&h.store.get(INDEXED, key).unwrap()).unwrap();
    assert_eq!(hydrated["id"], doc_id.as_str());
    assert_eq!(hydrated["country-code"], "US");

    // Analysis plan points the jobs at the derived result keys
    let plan = h.pipeline.plan_analysis(INDEXED, key);
    assert_eq!(plan.len(), 2);
    let metrics_key = derive_result_key(key, ResultStage::Metrics);
    assert_eq!(metrics_key, "acme/metrics/2024-01-01.jsonl");
    assert!(plan.iter().any(|job| job.results_key == metrics_key));

    // Metrics job output is merged into the indexed document
    h.store.insert(
        RESULTS,
        &metrics_key,
        json!({"id": doc_id, "ttr": 1.0, "foreignisms": []}).to_string(),
    );
    let body = h.pipeline.merge(RESULTS, &metrics_key).await.unwrap();
    assert_eq!(body, json!({"indexedCount": 1}));

    let requests = h.search.requests();
    let merge_request = requests.last().unwrap();
    assert_eq!(merge_request.len(), 1);
    assert!(matches!(
        &merge_request[0],
        BulkAction::Update { index, id, .. } if index == "documents" && id == doc_id
    ));

    let merged = h.search.document("documents", doc_id).unwrap();
    assert_eq!(merged["ttr"], 1.0);
    assert_eq!(merged["text"], "Hello world");
}

#[tokio::test]
async fn test_error_findings_are_inserted_separately() {
    let h = harness();
    let key = "acme/errors/2024-01-01.jsonl";
    let findings = [
        json!({"id": "f-1", "document-id": "doc-1", "rule-id": "EN_A_VS_AN", "source": "acme"}),
        json!({"id": "f-2", "document-id": "doc-1", "rule-id": "COMMA_COMPOUND_SENTENCE"}),
    ];
    let contents = findings
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    h.store.insert(RESULTS, key, contents);

    let body = h.pipeline.merge(RESULTS, key).await.unwrap();
    assert_eq!(body, json!({"indexedCount": 2}));

    let errors = h.search.documents("language-errors");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].1["document-id"], "doc-1");
    assert!(h.search.documents("documents").is_empty());
}

#[tokio::test]
async fn test_metrics_for_unknown_document_fail_the_merge() {
    let h = harness();
    let key = "acme/metrics/2024-01-01.jsonl";
    h.store
        .insert(RESULTS, key, json!({"id": "ghost", "ttr": 0.2}).to_string());

    let err = h.pipeline.merge(RESULTS, key).await.unwrap_err();
    match &err {
        PipelineError::Indexation { details } => {
            let failures: Vec<Value> = serde_json::from_str(details).unwrap();
            assert_eq!(failures[0]["update"]["_id"], "ghost");
        }
        other => panic!("expected indexation error, got {other:?}"),
    }

    let response = StageResponse::from_error(&err);
    assert_eq!(response.status_code, 400);
    assert_eq!(response.error_type, Some("IndexationError"));
}

#[tokio::test]
async fn test_rejected_batch_is_quarantined() {
    let h = harness();
    let key = "acme/2024-01-02.jsonl";
    let contents = format!("{BATCH}\n{{\"country\":\"US\",\"country-code\":\"US\",\"date\":\"2024-01-32\",\"text\":\"x\"}}");
    h.store.insert(SOURCES, key, contents.as_str());

    let response = StageResponse::from(
        h.pipeline
            .handle_event(Stage::Validate, &write_event(SOURCES, key, contents.len()))
            .await,
    );

    assert_eq!(response.status_code, 422);
    assert_eq!(response.error_type, Some("DateFormatError"));
    assert_eq!(
        response.message.as_deref(),
        Some("Invalid document at line 2. Field date does not match format %Y-%m-%d.")
    );
    assert!(!h.store.contains(SOURCES, key));
    assert_eq!(h.store.get(QUARANTINE, key).as_deref(), Some(contents.as_str()));
}

#[tokio::test]
async fn test_rejected_merge_item_leaves_document_untouched() {
    let h = harness();
    let key = "acme/2024-01-03.jsonl";
    h.store.insert(SOURCES, key, BATCH);

    h.pipeline.index(SOURCES, key).await.unwrap();
    let (doc_id, _) = h.search.documents("documents").remove(0);
    h.search.reject_id(doc_id.as_str());

    let metrics_key = derive_result_key(key, ResultStage::Metrics);
    h.store
        .insert(RESULTS, &metrics_key, json!({"id": doc_id, "ttr": 0.3}).to_string());

    let err = h.pipeline.merge(RESULTS, &metrics_key).await.unwrap_err();
    assert!(matches!(err, PipelineError::Indexation { .. }));
    assert_eq!(err.status(), 400);

    let document = h.search.document("documents", &doc_id).unwrap();
    assert!(document.get("ttr").is_none());
}

#[tokio::test]
async fn test_foreignisms_are_read_from_config_files_bucket() {
    let h = harness();
    h.store
        .insert("config-files", "foreignisms.txt", "Marketing\nbriefing\n");

    let body = h
        .pipeline
        .find_foreignisms("El marketing y el briefing: marketing.")
        .await
        .unwrap();

    assert_eq!(body["count"], 3);
    assert_eq!(
        body["foreignisms"],
        json!(["marketing", "marketing", "briefing"])
    );
}
