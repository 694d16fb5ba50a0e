//! Tier-2 injection pipeline: per-session dedup across turns, the
//! confidence gate, audit rows, and compaction reset.

use engram_core::injection::{run_tier2, InjectionSessionState};
use engram_core::{MemorySearch, MemoryStorage, MemoryType, StoreStatus, VectorStore};
use std::sync::Arc;
use test_utils::{test_config, InMemoryVectorStore, MockEmbedder};

struct Harness {
    search: MemorySearch,
    storage: MemoryStorage,
    config: Arc<engram_core::Config>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(MockEmbedder::new(64));
    let search = MemorySearch::new(
        store.clone() as Arc<dyn VectorStore>,
        embedder.clone() as Arc<dyn engram_core::embedding::Embedder>,
    );
    let storage = MemoryStorage::new(store, embedder, Arc::clone(&config));
    Harness {
        search,
        storage,
        config,
        _dir: dir,
    }
}

fn unique_session(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// Seed one decision whose content embeds identically to the prompt the
/// test will send (the mock embedder is deterministic on exact text).
async fn seed_decision(h: &Harness, content: &str) {
    let request = engram_core::StoreRequest::new(
        content,
        "/srv/proj",
        MemoryType::Decision,
        "user_prompt_capture",
        "seed-session",
    )
    .with_group_id("proj");
    let outcome = h.storage.store_memory(request).await.unwrap();
    assert_eq!(outcome.status, StoreStatus::Stored);
}

#[tokio::test]
async fn same_prompt_across_turns_injects_disjoint_ids() {
    let h = harness();
    let prompt = "why did we choose port 26350?";
    // Three distinct records; the first embeds exactly like the prompt.
    seed_decision(&h, prompt).await;
    seed_decision(&h, &format!("{prompt} ")).await;
    seed_decision(&h, &format!(" {prompt}")).await;

    let session = unique_session("dedup");
    let mut seen = std::collections::HashSet::new();

    for _turn in 0..3 {
        let outcome = run_tier2(&h.search, &h.config, prompt, &session, "proj")
            .await
            .unwrap();
        let state = InjectionSessionState::load(&session);
        for id in &state.injected_point_ids {
            assert!(
                seen.insert(id.clone()),
                "id {id} injected twice across turns"
            );
        }
        // All injected so far are recorded monotonically.
        assert_eq!(state.injected_point_ids.len(), seen.len());
        drop(outcome);
    }

    let _ = std::fs::remove_file(InjectionSessionState::path(&session));
}

#[tokio::test]
async fn low_confidence_prompt_emits_nothing_but_advances_state() {
    let h = harness();
    seed_decision(&h, "we standardized on tokio for every async runtime decision").await;

    let session = unique_session("gate");
    // Unrelated prompt: the deterministic mock embedding is uncorrelated,
    // so the best score sits far below the 0.6 threshold.
    let outcome = run_tier2(
        &h.search,
        &h.config,
        "completely unrelated gardening question about tulips",
        &session,
        "proj",
    )
    .await
    .unwrap();

    assert!(outcome.context.is_empty());
    assert!(outcome.skipped_confidence);
    assert_eq!(outcome.results_selected, 0);

    let state = InjectionSessionState::load(&session);
    assert_eq!(state.turn_count, 1, "turn count advances on skip");

    // Audit row records the skip.
    let audit = std::fs::read_to_string(h.config.injection_audit_file()).unwrap();
    let row: serde_json::Value = serde_json::from_str(audit.lines().next_back().unwrap()).unwrap();
    assert_eq!(row["skipped_confidence"], true);
    assert_eq!(row["results_selected"], 0);

    let _ = std::fs::remove_file(InjectionSessionState::path(&session));
}

#[tokio::test]
async fn successful_injection_writes_audit_and_state() {
    let h = harness();
    let prompt = "why did we pick the discussions collection layout?";
    seed_decision(&h, prompt).await;

    let session = unique_session("audit");
    let outcome = run_tier2(&h.search, &h.config, prompt, &session, "proj")
        .await
        .unwrap();

    assert!(outcome.context.starts_with("<retrieved_context>"));
    assert!(outcome.context.ends_with("</retrieved_context>"));
    assert_eq!(outcome.results_selected, 1);
    assert!(outcome.tokens_used > 0);

    let state = InjectionSessionState::load(&session);
    assert_eq!(state.injected_point_ids.len(), 1);
    assert!(state.last_query_embedding.is_some());
    assert_eq!(state.total_tokens_injected, outcome.tokens_used);

    let audit = std::fs::read_to_string(h.config.injection_audit_file()).unwrap();
    let row: serde_json::Value = serde_json::from_str(audit.lines().next_back().unwrap()).unwrap();
    assert_eq!(row["tier"], 2);
    assert_eq!(row["skipped_confidence"], false);
    assert_eq!(row["results_selected"], 1);
    assert!(row["budget"].as_u64().unwrap() >= 500);

    let _ = std::fs::remove_file(InjectionSessionState::path(&session));
}

#[tokio::test]
async fn compaction_reset_clears_ids_but_keeps_drift() {
    let h = harness();
    let prompt = "why did we shard the session state files?";
    seed_decision(&h, prompt).await;

    let session = unique_session("compact");
    run_tier2(&h.search, &h.config, prompt, &session, "proj")
        .await
        .unwrap();

    let mut state = InjectionSessionState::load(&session);
    assert!(!state.injected_point_ids.is_empty());
    let embedding_before = state.last_query_embedding.clone();
    let drift_before = state.topic_drift;

    state.reset_after_compact();
    state.save().unwrap();

    let reloaded = InjectionSessionState::load(&session);
    assert!(reloaded.injected_point_ids.is_empty());
    assert_eq!(reloaded.last_query_embedding, embedding_before);
    assert!((reloaded.topic_drift - drift_before).abs() < f64::EPSILON);

    let _ = std::fs::remove_file(InjectionSessionState::path(&session));
}
