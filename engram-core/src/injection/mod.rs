//! Progressive context injection.
//!
//! Tier 1 runs once at session start and assembles a project bootstrap
//! block; Tier 2 runs on every user prompt with a confidence gate, an
//! adaptive token budget, and per-session dedup. Both emit a single
//! `<retrieved_context>` block or nothing.

mod bootstrap;
mod engine;
mod state;

pub use bootstrap::tier1_bootstrap;
pub use engine::{
    compute_adaptive_budget, compute_topic_drift, format_injection_output, log_injection_event,
    select_results_greedy, InjectionAuditEvent,
};
pub use state::InjectionSessionState;

use crate::config::Config;
use crate::error::Result;
use crate::observability::metrics;
use crate::search::{route_collections, route_group_id, MemorySearch, SearchHit, SearchQuery};
use chrono::Utc;
use tracing::{info, warn};

/// Outcome of one Tier-2 run, for callers that log or test against it.
#[derive(Debug)]
pub struct Tier2Outcome {
    /// The `additionalContext` payload; empty when gated or deduped out.
    pub context: String,
    pub results_considered: usize,
    pub results_selected: usize,
    pub tokens_used: usize,
    pub skipped_confidence: bool,
}

/// Run the full per-turn injection pipeline and persist session state.
pub async fn run_tier2(
    search: &MemorySearch,
    config: &Config,
    prompt: &str,
    session_id: &str,
    project: &str,
) -> Result<Tier2Outcome> {
    let mut state = InjectionSessionState::load(session_id);
    state.turn_count += 1;

    let routes = route_collections(prompt);
    let collection_names: Vec<String> =
        routes.iter().map(|r| r.collection.name().to_string()).collect();

    // Embed once; every routed collection reuses the same vector, and it
    // doubles as the drift reference for the next turn.
    let query_vector = match search.embed_query(prompt).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(error = %e, "query embedding failed, skipping injection");
            None
        }
    };
    let Some(query_vector) = query_vector else {
        state.save()?;
        return Ok(Tier2Outcome {
            context: String::new(),
            results_considered: 0,
            results_selected: 0,
            tokens_used: 0,
            skipped_confidence: false,
        });
    };

    let mut all_results: Vec<SearchHit> = Vec::new();
    for route in &routes {
        let mut query = SearchQuery::new(prompt, route.collection)
            .with_limit(config.max_retrievals)
            .with_vector(query_vector.clone());
        query.group_id = route_group_id(*route, project);
        match search.search(query).await {
            Ok(hits) => all_results.extend(hits),
            Err(e) => warn!(
                collection = route.collection.name(),
                error = %e,
                "collection search failed, continuing"
            ),
        }
    }
    all_results.sort_by(|a, b| b.score.total_cmp(&a.score));

    let best_score = all_results.first().map_or(0.0, |hit| f64::from(hit.score));

    // Confidence gate: not worth its tokens, emit nothing.
    if best_score < config.injection_confidence_threshold {
        info!(
            best_score,
            threshold = config.injection_confidence_threshold,
            turn = state.turn_count,
            "injection skipped below confidence threshold"
        );
        log_injection_event(
            config,
            &InjectionAuditEvent::skip(
                "UserPromptSubmit",
                project,
                session_id,
                all_results.len(),
                best_score,
                collection_names,
            ),
        );
        state.save()?;
        return Ok(Tier2Outcome {
            context: String::new(),
            results_considered: all_results.len(),
            results_selected: 0,
            tokens_used: 0,
            skipped_confidence: true,
        });
    }

    let drift = compute_topic_drift(
        Some(&query_vector),
        state.last_query_embedding.as_deref(),
    );
    let budget = compute_adaptive_budget(best_score, &all_results, drift, config);
    let (selected, tokens_used) =
        select_results_greedy(&all_results, budget, &state.injected_point_ids);

    let context = format_injection_output(&selected, 2);

    state
        .injected_point_ids
        .extend(selected.iter().map(|hit| hit.id.to_string()));
    state.last_query_embedding = Some(query_vector);
    state.topic_drift = drift;
    state.total_tokens_injected += tokens_used;
    state.save()?;

    log_injection_event(
        config,
        &InjectionAuditEvent {
            tier: 2,
            trigger: "UserPromptSubmit",
            project,
            session_id,
            results_considered: all_results.len(),
            results_selected: selected.len(),
            tokens_used,
            budget,
            best_score,
            skipped_confidence: false,
            topic_drift: drift,
            collections_searched: collection_names,
            ts: Utc::now().to_rfc3339(),
        },
    );
    if tokens_used > 0 {
        metrics::record_tokens("injection", "output", tokens_used);
    }

    Ok(Tier2Outcome {
        context,
        results_considered: all_results.len(),
        results_selected: selected.len(),
        tokens_used,
        skipped_confidence: false,
    })
}
