//! Retry queue durability: enqueue format, backoff, DLQ, lock exclusion,
//! and the recovery round-trip through the storage core.

use engram_core::queue::{QueueLock, RetryQueue};
use engram_core::{Error, MemoryStorage, MemoryType, StoreStatus};
use std::sync::Arc;
use test_utils::{store_request, test_config, InMemoryVectorStore, MockEmbedder};

#[test]
fn enqueued_entry_lands_as_one_json_line() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = RetryQueue::new(&config);

    let id = queue
        .enqueue(
            store_request("park me until the store is back", MemoryType::Decision),
            "store_unavailable",
            true,
        )
        .unwrap();

    let raw = std::fs::read_to_string(config.retry_queue_file()).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 1);

    let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(entry["id"].as_str().unwrap(), id.to_string());
    assert_eq!(entry["failure_reason"], "store_unavailable");
    assert_eq!(entry["retry_count"], 0);
    assert_eq!(entry["max_retries"], 3);
}

#[test]
fn backoff_schedules_future_retries() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = RetryQueue::new(&config);

    let id = queue
        .enqueue(
            store_request("entry that keeps failing on retry", MemoryType::Decision),
            "store_unavailable",
            true,
        )
        .unwrap();

    assert_eq!(queue.get_pending(10, false).unwrap().len(), 1);
    queue.mark_failed(id).unwrap();
    // Rescheduled into the future, so not pending right now.
    assert!(queue.get_pending(10, false).unwrap().is_empty());

    let stats = queue.stats().unwrap();
    assert_eq!(stats.total_items, 1);
    assert_eq!(stats.awaiting_backoff, 1);
}

#[test]
fn exhausted_entries_move_to_the_dead_letter_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = RetryQueue::new(&config);

    queue
        .enqueue(
            store_request("dead letter candidate content here", MemoryType::Decision),
            "store_unavailable",
            true,
        )
        .unwrap();
    let entry = queue.get_pending(1, false).unwrap().remove(0);
    queue.move_to_dlq(&entry).unwrap();

    assert_eq!(queue.len().unwrap(), 0);
    let dlq = std::fs::read_to_string(config.retry_dlq_file()).unwrap();
    let dead: serde_json::Value = serde_json::from_str(dlq.lines().next().unwrap()).unwrap();
    assert_eq!(dead["id"].as_str().unwrap(), entry.id.to_string());
    assert!(dead["moved_to_dlq_at"].is_string());
}

#[test]
fn second_lock_acquisition_fails_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let held = QueueLock::acquire(&config).unwrap();
    let conflict = QueueLock::acquire(&config);
    assert!(matches!(conflict, Err(Error::QueueLocked)));

    drop(held);
    assert!(QueueLock::acquire(&config).is_ok());
}

#[test]
fn corrupt_lines_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let queue = RetryQueue::new(&config);

    queue
        .enqueue(
            store_request("good entry surrounded by junk", MemoryType::Decision),
            "store_unavailable",
            true,
        )
        .unwrap();
    let mut raw = std::fs::read_to_string(config.retry_queue_file()).unwrap();
    raw.insert_str(0, "{corrupt line\n");
    std::fs::write(config.retry_queue_file(), raw).unwrap();

    assert_eq!(queue.get_pending(10, false).unwrap().len(), 1);
}

#[tokio::test]
async fn direct_path_surfaces_transport_errors_for_the_processor() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder, Arc::clone(&config));

    store.set_offline(true);
    let request = store_request(
        "the processor needs to see this failure",
        MemoryType::Decision,
    );
    let result = storage.store_memory_direct(&request).await;
    match result {
        Err(e) => assert!(e.is_recoverable(), "transport errors must be recoverable"),
        Ok(outcome) => panic!("expected an error, got {:?}", outcome.status),
    }

    // And crucially: nothing self-queued.
    let queue = RetryQueue::new(&config);
    assert_eq!(queue.len().unwrap(), 0);
}

#[tokio::test]
async fn outage_round_trip_recovers_through_the_storage_core() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let storage = MemoryStorage::new(store.clone(), embedder.clone(), Arc::clone(&config));

    // Outage: the write parks in the queue.
    store.set_offline(true);
    let request = store_request(
        "memory written during the outage window",
        MemoryType::Decision,
    );
    let outcome = storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Queued);

    // Production enqueue applies an initial backoff, so read the raw
    // entries rather than the ready-now view.
    let queue = RetryQueue::new(&config);
    let pending = queue.entries().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 0);
    assert_eq!(pending[0].failure_reason, "store_unavailable");

    // Store recovers: rehydrating the queued request stores a real point
    // with the same content hash.
    store.set_offline(false);
    let entry = &pending[0];
    let recovered = storage
        .store_memory(entry.memory_data.clone())
        .await
        .unwrap();
    assert_eq!(recovered.status, StoreStatus::Stored);
    queue.dequeue(entry.id).unwrap();

    assert_eq!(queue.len().unwrap(), 0);
    let payload = store
        .payload_of(
            engram_core::Collection::Discussions,
            recovered.memory_id.unwrap(),
        )
        .unwrap();
    assert_eq!(
        payload.get("content_hash").unwrap().as_str().unwrap(),
        engram_core::types::content_hash("memory written during the outage window")
    );
}
