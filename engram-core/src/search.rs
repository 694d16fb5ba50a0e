//! Semantic search with collection routing and tenancy scoping.

use crate::embedding::{embed_one, Embedder};
use crate::error::Result;
use crate::observability::metrics;
use crate::triggers::{detect_decision_keywords, extract_file_paths};
use crate::types::{Collection, MemoryType, ModelKind};
use crate::vector::{PointFilter, VectorStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One flattened search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub content: String,
    pub memory_type: String,
    pub source_hook: String,
    pub group_id: String,
    pub timestamp: String,
    /// The collection the hit came from; filled in by multi-collection
    /// callers.
    pub collection: Collection,
    pub payload: Map<String, Value>,
}

fn hit_from_payload(
    id: Uuid,
    score: f32,
    collection: Collection,
    payload: Map<String, Value>,
) -> SearchHit {
    let get = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    SearchHit {
        id,
        score,
        content: get("content"),
        memory_type: get("type"),
        source_hook: get("source_hook"),
        group_id: get("group_id"),
        timestamp: get("timestamp"),
        collection,
        payload,
    }
}

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub collection: Collection,
    /// Tenant scope; `None` searches shared content unscoped.
    pub group_id: Option<String>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub memory_types: Option<Vec<MemoryType>>,
    pub agent_id: Option<String>,
    pub source: Option<String>,
    /// Pre-computed query embedding; skips the embedding call
    /// (`fast_mode` for callers that already embedded upstream).
    pub query_vector: Option<Vec<f32>>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(query: impl Into<String>, collection: Collection) -> Self {
        Self {
            query: query.into(),
            collection,
            group_id: None,
            limit: 5,
            score_threshold: None,
            memory_types: None,
            agent_id: None,
            source: None,
            query_vector: None,
        }
    }

    #[must_use]
    pub fn for_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.memory_types = Some(types);
        self
    }

    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }
}

/// Retrieval front-end over the store and the embedder.
pub struct MemorySearch {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl MemorySearch {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// ANN search; embeds the query once unless a vector was supplied.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>> {
        let vector = match query.query_vector {
            Some(vector) => vector,
            None => embed_one(self.embedder.as_ref(), &query.query, ModelKind::Prose).await?,
        };

        let filter = PointFilter {
            group_id: query.group_id,
            memory_types: query.memory_types,
            agent_id: query.agent_id,
            source: query.source,
            ..PointFilter::default()
        };

        let started = std::time::Instant::now();
        let result = self
            .store
            .search(
                query.collection,
                &vector,
                &filter,
                query.limit,
                query.score_threshold,
            )
            .await;
        metrics::observe_retrieval_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(points) => {
                metrics::record_retrieval(query.collection.name(), "success");
                debug!(
                    collection = query.collection.name(),
                    hits = points.len(),
                    "search complete"
                );
                Ok(points
                    .into_iter()
                    .map(|p| hit_from_payload(p.id, p.score, query.collection, p.payload))
                    .collect())
            }
            Err(e) => {
                metrics::record_retrieval(query.collection.name(), "failure");
                Err(e)
            }
        }
    }

    /// Embed a query once, for callers that fan one vector across
    /// collections and keep it for drift accounting.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        embed_one(self.embedder.as_ref(), query, ModelKind::Prose).await
    }

    /// Latest records of a type by wall-clock time, no semantic ranking.
    /// The "most recent handoff" path.
    pub async fn get_recent(
        &self,
        memory_type: MemoryType,
        group_id: Option<&str>,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let collection = memory_type.collection();
        let filter = PointFilter {
            group_id: group_id.map(ToString::to_string),
            memory_types: Some(vec![memory_type]),
            agent_id: agent_id.map(ToString::to_string),
            ..PointFilter::default()
        };
        let points = self.store.scroll_recent(collection, &filter, limit).await?;
        Ok(points
            .into_iter()
            .map(|p| hit_from_payload(p.id, 0.0, collection, p.payload))
            .collect())
    }

    /// Recency scroll with a caller-built filter (connector enrichment,
    /// maintenance sweeps).
    pub async fn recent_with_filter(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let points = self.store.scroll_recent(collection, filter, limit).await?;
        Ok(points
            .into_iter()
            .map(|p| hit_from_payload(p.id, 0.0, collection, p.payload))
            .collect())
    }
}

/// One routing decision: which collection to search and whether it is
/// shared (searched without a group filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget {
    pub collection: Collection,
    pub shared: bool,
}

const BEST_PRACTICE_KEYWORDS: &[&str] = &[
    "best practice",
    "convention",
    "guideline",
    "naming",
    "code style",
    "standard",
    "anti-pattern",
];

/// Route a prompt to target collections. Rules in order, repeated hits on
/// the same collection collapse, unknown intent cascades all three.
#[must_use]
pub fn route_collections(prompt: &str) -> Vec<RouteTarget> {
    let mut targets: Vec<RouteTarget> = Vec::new();
    let lower = prompt.to_lowercase();

    if detect_decision_keywords(prompt).is_some() {
        push_route(&mut targets, Collection::Discussions, false);
    }
    if BEST_PRACTICE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        push_route(&mut targets, Collection::Conventions, true);
    }
    if !extract_file_paths(prompt).is_empty() {
        push_route(&mut targets, Collection::CodePatterns, false);
    }

    if targets.is_empty() {
        // Explicit intent mapping.
        if lower.starts_with("how ") || lower.contains("how do i") || lower.contains("how to") {
            push_route(&mut targets, Collection::CodePatterns, false);
        } else if lower.starts_with("what ") {
            push_route(&mut targets, Collection::Conventions, true);
        } else if lower.starts_with("why ") {
            push_route(&mut targets, Collection::Discussions, false);
        }
    }

    if targets.is_empty() {
        // Unknown intent: cascade everything.
        push_route(&mut targets, Collection::Discussions, false);
        push_route(&mut targets, Collection::Conventions, true);
        push_route(&mut targets, Collection::CodePatterns, false);
    }

    targets
}

fn push_route(targets: &mut Vec<RouteTarget>, collection: Collection, shared: bool) {
    if !targets.iter().any(|t| t.collection == collection) {
        targets.push(RouteTarget { collection, shared });
    }
}

/// Resolve the group filter for a route: shared routes search unscoped.
#[must_use]
pub fn route_group_id(route: RouteTarget, project: &str) -> Option<String> {
    if route.shared {
        None
    } else {
        Some(project.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_prompts_route_to_discussions() {
        let targets = route_collections("why did we choose port 26350?");
        assert_eq!(targets[0].collection, Collection::Discussions);
        assert!(!targets[0].shared);
    }

    #[test]
    fn best_practice_prompts_route_shared() {
        let targets = route_collections("what is the naming convention for handlers");
        assert!(targets
            .iter()
            .any(|t| t.collection == Collection::Conventions && t.shared));
    }

    #[test]
    fn file_paths_route_to_code_patterns() {
        let targets = route_collections("refactor src/storage/mod.rs to use the new trait");
        assert!(targets
            .iter()
            .any(|t| t.collection == Collection::CodePatterns));
    }

    #[test]
    fn unknown_intent_cascades_all_three() {
        let targets = route_collections("ship it");
        assert_eq!(targets.len(), 3);
    }

    #[test]
    fn repeated_signals_deduplicate() {
        let targets =
            route_collections("why did we decide on the naming convention in src/types/mod.rs?");
        let discussions = targets
            .iter()
            .filter(|t| t.collection == Collection::Discussions)
            .count();
        assert_eq!(discussions, 1);
    }

    #[test]
    fn how_intent_maps_to_code_patterns() {
        let targets = route_collections("how to add retry backoff");
        assert_eq!(targets[0].collection, Collection::CodePatterns);
    }
}
