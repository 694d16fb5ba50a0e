//! Direct-vector backfill: pending records get a real vector under the
//! same point id, status flips to complete.

use engram_core::storage::backfill::backfill_pending;
use engram_core::{Collection, EmbeddingStatus, MemoryStorage, MemoryType, StoreStatus};
use std::sync::Arc;
use test_utils::{store_request, test_config, InMemoryVectorStore, MockEmbedder};

#[tokio::test]
async fn pending_record_is_promoted_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder.clone(), Arc::clone(&config));

    // Write while the embedder is down: pending zero vector.
    embedder.set_failing(true);
    let outcome = storage
        .store_memory(store_request(
            "content stored before the embedder came back",
            MemoryType::Decision,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);
    assert_eq!(outcome.embedding_status, Some(EmbeddingStatus::Pending));
    let id = outcome.memory_id.unwrap();

    // Embedder recovers; backfill promotes the point.
    embedder.set_failing(false);
    let stats = backfill_pending(
        store.as_ref(),
        embedder.as_ref(),
        Collection::Discussions,
        10,
        false,
    )
    .await
    .unwrap();
    assert_eq!(stats.promoted, 1);
    assert_eq!(stats.failed, 0);

    // Same id, real vector of the configured dimension, status complete.
    let vector = store.vector_of(Collection::Discussions, id).unwrap();
    assert_eq!(vector.len(), 64);
    assert!(vector.iter().any(|component| *component != 0.0));

    let payload = store.payload_of(Collection::Discussions, id).unwrap();
    assert_eq!(
        payload.get("embedding_status").unwrap().as_str().unwrap(),
        "complete"
    );
}

#[tokio::test]
async fn dry_run_counts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder.clone(), Arc::clone(&config));

    embedder.set_failing(true);
    let outcome = storage
        .store_memory(store_request(
            "still pending after the dry run finishes",
            MemoryType::Decision,
        ))
        .await
        .unwrap();
    let id = outcome.memory_id.unwrap();
    embedder.set_failing(false);

    let stats = backfill_pending(
        store.as_ref(),
        embedder.as_ref(),
        Collection::Discussions,
        10,
        true,
    )
    .await
    .unwrap();
    assert_eq!(stats.pending_seen, 1);
    assert_eq!(stats.promoted, 0);

    let payload = store.payload_of(Collection::Discussions, id).unwrap();
    assert_eq!(
        payload.get("embedding_status").unwrap().as_str().unwrap(),
        "pending"
    );
}

#[tokio::test]
async fn per_point_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder.clone(), Arc::clone(&config));

    embedder.set_failing(true);
    for content in [
        "first pending record awaiting promotion",
        "second pending record awaiting promotion",
    ] {
        storage
            .store_memory(store_request(content, MemoryType::Decision))
            .await
            .unwrap();
    }

    // Embedder stays down: every point fails individually, the sweep
    // still completes.
    let stats = backfill_pending(
        store.as_ref(),
        embedder.as_ref(),
        Collection::Discussions,
        10,
        false,
    )
    .await
    .unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.promoted, 0);
}
