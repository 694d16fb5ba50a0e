//! Classifier worker semantics: queue FIFO, confidence-gated write-back,
//! and the trace span left behind.

use engram_core::classifier::process_classification_task;
use engram_core::queue::{ClassificationQueue, ClassificationTask};
use engram_core::{Collection, MemoryStorage, MemoryType, StoreStatus};
use std::sync::Arc;
use test_utils::{store_request, test_config, InMemoryVectorStore, MockClassifier, MockEmbedder};

struct Harness {
    store: Arc<InMemoryVectorStore>,
    config: Arc<engram_core::Config>,
    queue: ClassificationQueue,
    _dir: tempfile::TempDir,
}

async fn seeded_harness() -> (Harness, uuid::Uuid) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder, Arc::clone(&config));

    let outcome = storage
        .store_memory(store_request(
            "Fixed the flaky import by pinning the requests version",
            MemoryType::Implementation,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);
    let id = outcome.memory_id.unwrap();

    let queue = ClassificationQueue::new(&config);
    (
        Harness {
            store,
            config,
            queue,
            _dir: dir,
        },
        id,
    )
}

fn task_for(id: uuid::Uuid) -> ClassificationTask {
    ClassificationTask {
        point_id: id,
        collection: Collection::CodePatterns,
        content: "Fixed the flaky import by pinning the requests version".to_string(),
        current_type: MemoryType::Implementation,
        group_id: "proj".to_string(),
        source_hook: "post_tool_capture".to_string(),
        created_at: chrono::Utc::now(),
        session_id: Some("s1".to_string()),
        trace_id: None,
    }
}

#[tokio::test]
async fn confident_verdict_updates_the_payload() {
    let (h, id) = seeded_harness().await;
    let classifier = MockClassifier {
        verdict_type: MemoryType::ErrorFix,
        confidence: 0.92,
    };

    let done = process_classification_task(
        &task_for(id),
        &classifier,
        h.store.as_ref(),
        &h.config,
    )
    .await
    .unwrap();
    assert!(done);

    let payload = h.store.payload_of(Collection::CodePatterns, id).unwrap();
    assert_eq!(payload.get("type").unwrap().as_str().unwrap(), "error_fix");
    assert!(payload.get("is_classified").unwrap().as_bool().unwrap());
    assert!(
        (payload
            .get("classification_confidence")
            .unwrap()
            .as_f64()
            .unwrap()
            - 0.92)
            .abs()
            < 1e-9
    );
    assert!(payload.get("classified_at").is_some());
    assert_eq!(
        payload
            .get("classification_provider")
            .unwrap()
            .as_str()
            .unwrap(),
        "mock"
    );
}

#[tokio::test]
async fn low_confidence_verdict_leaves_the_type_alone() {
    let (h, id) = seeded_harness().await;
    let classifier = MockClassifier {
        verdict_type: MemoryType::Refactor,
        confidence: 0.4,
    };

    let done = process_classification_task(
        &task_for(id),
        &classifier,
        h.store.as_ref(),
        &h.config,
    )
    .await
    .unwrap();
    assert!(done, "below-threshold tasks still count as processed");

    let payload = h.store.payload_of(Collection::CodePatterns, id).unwrap();
    assert_eq!(
        payload.get("type").unwrap().as_str().unwrap(),
        "implementation"
    );
    assert!(payload.get("is_classified").is_none());
}

#[tokio::test]
async fn classification_leaves_a_trace_span_with_real_timing() {
    let (h, id) = seeded_harness().await;
    let classifier = MockClassifier {
        verdict_type: MemoryType::ErrorFix,
        confidence: 0.9,
    };

    process_classification_task(&task_for(id), &classifier, h.store.as_ref(), &h.config)
        .await
        .unwrap();

    let spans = engram_core::observability::trace::buffered_spans(&h.config);
    assert_eq!(spans.len(), 1);
    let span: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&spans[0]).unwrap()).unwrap();
    assert_eq!(span["name"], "classify");
    assert_eq!(span["model"], "mock-model");
    assert_eq!(span["input_tokens"], 10);
    let start = span["start_time"].as_str().unwrap();
    let end = span["end_time"].as_str().unwrap();
    assert!(start <= end, "span times must be real wall-clock bounds");
}

#[tokio::test]
async fn storage_enqueues_a_classification_task() {
    let (h, id) = seeded_harness().await;
    // The seeded store_memory call should have queued exactly one task
    // for the new point.
    assert_eq!(h.queue.size().unwrap(), 1);
    let batch = h.queue.dequeue_batch(10).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].point_id, id);
    assert_eq!(batch[0].current_type, MemoryType::Implementation);
    assert!(batch[0].content.len() <= 2000);
    assert_eq!(h.queue.size().unwrap(), 0);
}
