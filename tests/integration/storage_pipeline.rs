//! Canonical write path, end to end against the in-memory collaborators:
//! dedup, security round-trip, outage queuing, embedding degradation.

use engram_core::{
    Collection, EmbeddingStatus, MemoryStorage, MemoryType, StoreRequest, StoreStatus,
};
use std::sync::Arc;
use test_utils::{store_request, test_config, InMemoryVectorStore, MockEmbedder};

struct Harness {
    storage: MemoryStorage,
    store: Arc<InMemoryVectorStore>,
    embedder: Arc<MockEmbedder>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder.clone(), config);
    Harness {
        storage,
        store,
        embedder,
        _dir: dir,
    }
}

#[tokio::test]
async fn duplicate_content_returns_same_memory_id() {
    let h = harness();
    let request = store_request(
        "fn parse_config() -> Result<Config> { todo!() }",
        MemoryType::Implementation,
    );

    let first = h.storage.store_memory(request.clone()).await.unwrap();
    assert_eq!(first.status, StoreStatus::Stored);

    let second = h.storage.store_memory(request).await.unwrap();
    assert_eq!(second.status, StoreStatus::Duplicate);
    assert_eq!(first.memory_id, second.memory_id);

    assert_eq!(h.store.point_count(Collection::CodePatterns), 1);
}

#[tokio::test]
async fn hard_secret_never_reaches_the_store() {
    let h = harness();
    let request = store_request(
        &format!("export GITHUB_TOKEN=ghp_{}", "A".repeat(36)),
        MemoryType::Implementation,
    );

    let outcome = h.storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Blocked);
    assert!(outcome.memory_id.is_none());
    assert_eq!(h.store.point_count(Collection::CodePatterns), 0);
}

#[tokio::test]
async fn pii_is_masked_before_storage() {
    let h = harness();
    let request = store_request(
        "Deploy contact is ops-team@example.com for incidents this quarter",
        MemoryType::Decision,
    );

    let outcome = h.storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);

    let payload = h
        .store
        .payload_of(Collection::Discussions, outcome.memory_id.unwrap())
        .unwrap();
    let content = payload.get("content").unwrap().as_str().unwrap();
    assert!(content.contains("[EMAIL_REDACTED]"));
    assert!(!content.contains("ops-team@example.com"));
}

#[tokio::test]
async fn store_outage_queues_the_write() {
    let h = harness();
    h.store.set_offline(true);

    let request = store_request(
        "retry this write once the store is back",
        MemoryType::Decision,
    );
    let outcome = h.storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Queued);
}

#[tokio::test]
async fn embedding_failure_stores_pending_zero_vector() {
    let h = harness();
    h.embedder.set_failing(true);

    let request = store_request(
        "this content could not be embedded right away",
        MemoryType::Decision,
    );
    let outcome = h.storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);
    assert_eq!(outcome.embedding_status, Some(EmbeddingStatus::Pending));

    let id = outcome.memory_id.unwrap();
    let vector = h.store.vector_of(Collection::Discussions, id).unwrap();
    assert!(vector.iter().all(|component| *component == 0.0));

    let payload = h.store.payload_of(Collection::Discussions, id).unwrap();
    assert_eq!(
        payload.get("embedding_status").unwrap().as_str().unwrap(),
        "pending"
    );
}

#[tokio::test]
async fn validation_rejects_junk_before_any_io() {
    let h = harness();

    let short = store_request("tiny", MemoryType::Decision);
    assert!(h.storage.store_memory(short).await.is_err());

    let mut bad_hook = store_request(
        "content long enough to pass the length gate",
        MemoryType::Decision,
    );
    bad_hook.source_hook = "not_a_real_hook".to_string();
    assert!(h.storage.store_memory(bad_hook).await.is_err());
}

#[tokio::test]
async fn payload_carries_freshness_and_identity_fields() {
    let h = harness();
    let request = store_request(
        "Fix: ModuleNotFoundError: No module named 'requests'. Resolution: pip install requests",
        MemoryType::ErrorFix,
    );
    let outcome = h.storage.store_memory(request).await.unwrap();
    let payload = h
        .store
        .payload_of(Collection::CodePatterns, outcome.memory_id.unwrap())
        .unwrap();

    assert_eq!(payload.get("group_id").unwrap().as_str().unwrap(), "proj");
    assert_eq!(payload.get("type").unwrap().as_str().unwrap(), "error_fix");
    assert!(payload.get("content_hash").is_some());
    assert!(payload.get("ts").unwrap().as_i64().is_some());
    assert!((payload.get("source_authority").unwrap().as_f64().unwrap() - 0.4).abs() < 1e-9);
    assert!((payload.get("decay_score").unwrap().as_f64().unwrap() - 1.0).abs() < 1e-9);
    assert!(payload.get("is_current").unwrap().as_bool().unwrap());
    assert_eq!(payload.get("version").unwrap().as_u64().unwrap(), 1);
}

#[tokio::test]
async fn batch_variant_returns_one_result_per_record() {
    let h = harness();
    let requests = vec![
        store_request(
            "first perfectly storable memory content",
            MemoryType::Decision,
        ),
        store_request(
            &format!("hard secret ghp_{}", "B".repeat(36)),
            MemoryType::Decision,
        ),
        store_request(
            "first perfectly storable memory content",
            MemoryType::Decision,
        ),
    ];

    let results = h.storage.store_memories_batch(requests).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().status, StoreStatus::Stored);
    assert_eq!(results[1].as_ref().unwrap().status, StoreStatus::Blocked);
    assert_eq!(results[2].as_ref().unwrap().status, StoreStatus::Duplicate);
}

#[tokio::test]
async fn seeded_error_fix_is_retrievable_with_a_type_filter() {
    let h = harness();
    let fix = "Fix: ModuleNotFoundError: No module named 'requests'. Resolution: pip install requests";
    let outcome = h
        .storage
        .store_memory(store_request(fix, MemoryType::ErrorFix))
        .await
        .unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);

    let search = engram_core::MemorySearch::new(
        h.store.clone() as Arc<dyn engram_core::VectorStore>,
        h.embedder.clone() as Arc<dyn engram_core::embedding::Embedder>,
    );
    let hits = search
        .search(
            engram_core::SearchQuery::new(fix, Collection::CodePatterns)
                .for_group("proj")
                .with_types(vec![MemoryType::ErrorFix, MemoryType::ErrorPattern])
                .with_limit(3),
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.99);
    assert!(hits[0].content.contains("pip install requests"));
    assert_eq!(hits[0].memory_type, "error_fix");
}

#[tokio::test]
async fn bare_exception_line_round_trips_from_detection_to_retrieval() {
    // The error-detection flow on a stderr with no traceback preamble:
    // the signature comes from the plain line scan, and retrieving with
    // it finds the seeded fix.
    let h = harness();
    let stderr = "ModuleNotFoundError: No module named 'requests'";
    let signal = engram_core::triggers::detect_error_signal(stderr)
        .expect("bare compound exception names must trigger");
    assert_eq!(signal, stderr);

    let outcome = h
        .storage
        .store_memory(store_request(&signal, MemoryType::ErrorFix))
        .await
        .unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);

    let search = engram_core::MemorySearch::new(
        h.store.clone() as Arc<dyn engram_core::VectorStore>,
        h.embedder.clone() as Arc<dyn engram_core::embedding::Embedder>,
    );
    let hits = search
        .search(
            engram_core::SearchQuery::new(&signal, Collection::CodePatterns)
                .for_group("proj")
                .with_types(vec![MemoryType::ErrorFix, MemoryType::ErrorPattern])
                .with_limit(3),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("ModuleNotFoundError"));
}

#[tokio::test]
async fn long_user_message_is_sentence_truncated_with_marker() {
    let h = harness();
    let long_message = "This sentence repeats to exceed the budget. ".repeat(400);
    let request = store_request(&long_message, MemoryType::UserMessage);

    let outcome = h.storage.store_memory(request).await.unwrap();
    let payload = h
        .store
        .payload_of(Collection::Discussions, outcome.memory_id.unwrap())
        .unwrap();
    let content = payload.get("content").unwrap().as_str().unwrap();

    assert!(content.ends_with(" [...]"));
    assert!(engram_core::tokens::count_tokens(content) <= 2000);
}
