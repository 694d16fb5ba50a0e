//! Tier-1 session bootstrap.
//!
//! Assembled once at session start: the most recent agent handoff (via
//! the recency scroll, not semantic search), recent decisions and session
//! summaries, shared guidelines, and connector items newer than the last
//! session end. Everything merges, dedups by id, and renders as a single
//! block.

use super::engine::format_injection_output;
use crate::config::Config;
use crate::error::Result;
use crate::search::{MemorySearch, SearchHit, SearchQuery};
use crate::types::{Collection, MemoryType};
use crate::vector::PointFilter;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Connector records pulled per bootstrap, at most.
const ENRICHMENT_CAP: usize = 10;

/// Build the session-start context block for a project. Empty string when
/// nothing relevant exists.
pub async fn tier1_bootstrap(
    search: &MemorySearch,
    config: &Config,
    project: &str,
    session_id: &str,
) -> Result<String> {
    let mut merged: Vec<SearchHit> = Vec::new();

    // Most recent handoff, recency-ordered: semantic ranking would bury a
    // day-old handoff under an old but similar one.
    if config.agent_mode_enabled {
        match search
            .get_recent(
                MemoryType::AgentHandoff,
                Some(project),
                Some(&config.agent_id),
                1,
            )
            .await
        {
            Ok(hits) => merged.extend(hits),
            Err(e) => warn!(error = %e, "handoff lookup failed, continuing bootstrap"),
        }
    }

    // Recent decisions and session summaries, semantically ranked.
    let decisions = SearchQuery::new(
        format!("recent decisions and session summaries for {project}"),
        Collection::Discussions,
    )
    .for_group(project)
    .with_types(vec![
        MemoryType::Decision,
        MemoryType::SessionSummary,
        MemoryType::Session,
    ])
    .with_limit(5);
    match search.search(decisions).await {
        Ok(hits) => merged.extend(hits),
        Err(e) => warn!(error = %e, "decision lookup failed, continuing bootstrap"),
    }

    // Shared best-practice guidelines.
    let guidelines = SearchQuery::new(
        "project guidelines and best practices",
        Collection::Conventions,
    )
    .with_types(vec![MemoryType::BestPractice, MemoryType::Guideline])
    .with_limit(3);
    match search.search(guidelines).await {
        Ok(hits) => merged.extend(hits),
        Err(e) => warn!(error = %e, "guideline lookup failed, continuing bootstrap"),
    }

    // Connector enrichment: activity newer than the last session end.
    if let Some(baseline) = last_session_end(search, project).await {
        match connector_items_since(search, project, baseline).await {
            Ok(hits) => merged.extend(hits),
            Err(e) => warn!(error = %e, "connector enrichment failed, continuing bootstrap"),
        }
    }

    // Dedup by id across all sources.
    let mut seen: HashSet<Uuid> = HashSet::new();
    merged.retain(|hit| seen.insert(hit.id));

    tracing::info!(
        session_id,
        project,
        entries = merged.len(),
        "tier1 bootstrap assembled"
    );
    Ok(format_injection_output(&merged, 1))
}

/// Unix timestamp of the newest session summary, the enrichment baseline.
async fn last_session_end(search: &MemorySearch, project: &str) -> Option<i64> {
    let hits = search
        .get_recent(MemoryType::SessionSummary, Some(project), None, 1)
        .await
        .ok()?;
    hits.first()
        .and_then(|hit| hit.payload.get("ts"))
        .and_then(Value::as_i64)
}

async fn connector_items_since(
    search: &MemorySearch,
    project: &str,
    baseline: i64,
) -> Result<Vec<SearchHit>> {
    let filter = PointFilter {
        group_id: Some(project.to_string()),
        memory_types: Some(vec![
            MemoryType::GithubPr,
            MemoryType::GithubIssue,
            MemoryType::GithubCommit,
            MemoryType::GithubCi,
            MemoryType::GithubRelease,
            MemoryType::JiraIssue,
            MemoryType::JiraComment,
        ]),
        ts_after: Some(baseline),
        ..PointFilter::default()
    };
    search.recent_with_filter(Collection::Discussions, &filter, ENRICHMENT_CAP).await
}
