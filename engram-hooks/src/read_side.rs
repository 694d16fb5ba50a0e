//! Read-side hooks: bounded retrieval, context on stdout, always exit 0.

use anyhow::Result;
use engram_core::embedding::HttpEmbedder;
use engram_core::hooks::{emit_hook_output, HookInput};
use engram_core::injection::{run_tier2, tier1_bootstrap};
use engram_core::observability::metrics;
use engram_core::project::detect_project;
use engram_core::triggers::{detect_error_signal, is_first_edit_in_session, is_new_file};
use engram_core::vector::qdrant::QdrantStore;
use engram_core::{
    get_config, Collection, Config, MemorySearch, MemoryType, SearchQuery, VectorStore,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Search must fit in 450 ms of the 500 ms hook envelope; the rest is
/// JSON I/O and formatting.
const SEARCH_DEADLINE: Duration = Duration::from_millis(450);

fn read_input() -> Option<HookInput> {
    HookInput::read_from(&mut std::io::stdin().lock())
}

/// Build the search front-end, or `None` when the store is unreachable
/// (hooks degrade to silence, never to failure).
async fn search_client(config: &Config) -> Option<MemorySearch> {
    let store = match QdrantStore::connect(config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "vector store connect failed");
            return None;
        }
    };
    if !store.healthy().await {
        warn!("vector store unhealthy, skipping retrieval");
        return None;
    }
    let embedder = match HttpEmbedder::new(config) {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => {
            warn!(error = %e, "embedder construction failed");
            return None;
        }
    };
    Some(MemorySearch::new(store, embedder))
}

/// Bound a retrieval future by the hook deadline; timeout yields `None`.
async fn with_deadline<T>(future: impl Future<Output = T>) -> Option<T> {
    match tokio::time::timeout(SEARCH_DEADLINE, future).await {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("retrieval exceeded the hook deadline");
            None
        }
    }
}

/// `SessionStart`: Tier-1 bootstrap block.
pub async fn session_start() -> Result<()> {
    let Some(input) = read_input() else {
        emit_hook_output("SessionStart", "");
        return Ok(());
    };
    let config = get_config();
    let project = detect_project(&input.cwd_or_default());

    let Some(search) = search_client(&config).await else {
        emit_hook_output("SessionStart", "");
        return Ok(());
    };

    let context = with_deadline(tier1_bootstrap(&search, &config, &project, &input.session_id))
        .await
        .and_then(std::result::Result::ok)
        .unwrap_or_default();

    emit_hook_output("SessionStart", &context);
    Ok(())
}

/// `UserPromptSubmit` retrieval tier: the Tier-2 injection pipeline.
pub async fn context_injection_tier2() -> Result<()> {
    let Some(input) = read_input() else {
        emit_hook_output("UserPromptSubmit", "");
        return Ok(());
    };
    let Some(prompt) = input.prompt.as_deref().filter(|p| !p.trim().is_empty()) else {
        emit_hook_output("UserPromptSubmit", "");
        return Ok(());
    };

    let config = get_config();
    if !config.injection_enabled {
        emit_hook_output("UserPromptSubmit", "");
        return Ok(());
    }
    let project = detect_project(&input.cwd_or_default());

    let Some(search) = search_client(&config).await else {
        emit_hook_output("UserPromptSubmit", "");
        return Ok(());
    };

    let outcome = with_deadline(run_tier2(
        &search,
        &config,
        prompt,
        &input.session_id,
        &project,
    ))
    .await
    .and_then(std::result::Result::ok);

    match outcome {
        Some(outcome) => {
            info!(
                selected = outcome.results_selected,
                tokens = outcome.tokens_used,
                skipped = outcome.skipped_confidence,
                "tier2 injection complete"
            );
            emit_hook_output("UserPromptSubmit", &outcome.context);
        }
        None => emit_hook_output("UserPromptSubmit", ""),
    }
    Ok(())
}

/// Bash error detection: surface prior fixes for a failing command.
pub async fn error_detection() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    if input.tool_name.as_deref() != Some("Bash") {
        return Ok(());
    }
    let stderr = input.tool_response_str("stderr").unwrap_or_default();
    let stdout = input.tool_response_str("stdout").unwrap_or_default();
    let Some(signal) = detect_error_signal(stderr).or_else(|| detect_error_signal(stdout)) else {
        return Ok(());
    };
    metrics::record_trigger_fire("error_detection");

    let config = get_config();
    let project = detect_project(&input.cwd_or_default());
    let Some(search) = search_client(&config).await else {
        return Ok(());
    };

    let query = SearchQuery::new(signal, Collection::CodePatterns)
        .for_group(&project)
        .with_types(vec![MemoryType::ErrorFix, MemoryType::ErrorPattern])
        .with_limit(3);
    let hits = with_deadline(search.search(query))
        .await
        .and_then(std::result::Result::ok)
        .unwrap_or_default();
    if hits.is_empty() {
        return Ok(());
    }

    println!("SIMILAR ERROR FIXES FOUND");
    for hit in hits {
        println!("\n[{} | score {:.2}]\n{}", hit.memory_type, hit.score, hit.content.trim());
    }
    Ok(())
}

/// First edit of a file this session: retrieve file-specific patterns.
pub async fn first_edit_trigger() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    if input.tool_name.as_deref() != Some("Edit") {
        return Ok(());
    }
    let Some(file_path) = input.tool_input_str("file_path") else {
        return Ok(());
    };
    if !is_first_edit_in_session(file_path, &input.session_id) {
        return Ok(());
    }
    metrics::record_trigger_fire("first_edit");

    let config = get_config();
    let project = detect_project(&input.cwd_or_default());
    let Some(search) = search_client(&config).await else {
        return Ok(());
    };

    let query = SearchQuery::new(
        format!("patterns and prior changes for {file_path}"),
        Collection::CodePatterns,
    )
    .for_group(&project)
    .with_limit(3);
    print_block(
        "RELEVANT FILE PATTERNS",
        with_deadline(search.search(query)).await,
    );
    Ok(())
}

/// Writing a brand-new file: retrieve naming/structure conventions.
pub async fn new_file_trigger() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    if input.tool_name.as_deref() != Some("Write") {
        return Ok(());
    }
    let Some(file_path) = input.tool_input_str("file_path") else {
        return Ok(());
    };
    if !is_new_file(file_path) {
        return Ok(());
    }
    metrics::record_trigger_fire("new_file");

    let config = get_config();
    let Some(search) = search_client(&config).await else {
        return Ok(());
    };

    let query = SearchQuery::new(
        format!("naming and structure conventions for {file_path}"),
        Collection::Conventions,
    )
    .with_types(vec![
        MemoryType::Naming,
        MemoryType::Structure,
        MemoryType::Guideline,
    ])
    .with_limit(3);
    print_block(
        "PROJECT CONVENTIONS",
        with_deadline(search.search(query)).await,
    );
    Ok(())
}

/// After a file read: surface conventions for that file's language or
/// component.
pub async fn read_context_trigger() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    if input.tool_name.as_deref() != Some("Read") {
        return Ok(());
    }
    let Some(file_path) = input.tool_input_str("file_path") else {
        return Ok(());
    };
    let language = engram_core::extraction::detect_language(file_path);
    if language == "unknown" {
        return Ok(());
    }
    metrics::record_trigger_fire("read_context");

    let config = get_config();
    let Some(search) = search_client(&config).await else {
        return Ok(());
    };

    let query = SearchQuery::new(
        format!("conventions and guidelines for {language} code"),
        Collection::Conventions,
    )
    .with_limit(2);
    print_block(
        "RELEVANT CONVENTIONS",
        with_deadline(search.search(query)).await,
    );
    Ok(())
}

fn print_block(
    header: &str,
    hits: Option<engram_core::Result<Vec<engram_core::SearchHit>>>,
) {
    let Some(Ok(hits)) = hits else {
        return;
    };
    if hits.is_empty() {
        return;
    }
    println!("{header}");
    for hit in hits {
        println!("\n[{} | score {:.2}]\n{}", hit.memory_type, hit.score, hit.content.trim());
    }
}
