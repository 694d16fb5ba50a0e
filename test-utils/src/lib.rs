//! # Test Utilities
//!
//! In-memory doubles for the external collaborators (vector store,
//! embedder, classifier) plus fixture builders, so integration tests can
//! exercise the full capture–retrieve pipeline without a running Qdrant
//! or embedding service.

use async_trait::async_trait;
use engram_core::classifier::{ClassificationResult, Classifier};
use engram_core::embedding::Embedder;
use engram_core::error::{Error, Result};
use engram_core::types::{Collection, MemoryType, ModelKind};
use engram_core::vector::{PointFilter, ScoredPoint, StoredPoint, VectorStore};
use engram_core::{Config, StoreRequest};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Clone)]
struct InMemoryPoint {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

/// In-memory [`VectorStore`] with a switchable simulated outage.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<Collection, HashMap<Uuid, InMemoryPoint>>>,
    offline: AtomicBool,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport outage: every operation returns
    /// `StoreUnavailable` until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    /// Total points in a collection (test assertions).
    #[must_use]
    pub fn point_count(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .get(&collection)
            .map_or(0, HashMap::len)
    }

    /// Fetch one point's payload (test assertions).
    #[must_use]
    pub fn payload_of(&self, collection: Collection, id: Uuid) -> Option<Map<String, Value>> {
        self.collections
            .lock()
            .get(&collection)
            .and_then(|points| points.get(&id))
            .map(|point| point.payload.clone())
    }

    /// Fetch one point's vector (test assertions).
    #[must_use]
    pub fn vector_of(&self, collection: Collection, id: Uuid) -> Option<Vec<f32>> {
        self.collections
            .lock()
            .get(&collection)
            .and_then(|points| points.get(&id))
            .map(|point| point.vector.clone())
    }

    fn matches(filter: &PointFilter, payload: &Map<String, Value>) -> bool {
        let field = |key: &str| payload.get(key).and_then(Value::as_str);
        if let Some(group_id) = &filter.group_id {
            if field("group_id") != Some(group_id.as_str()) {
                return false;
            }
        }
        if let Some(hash) = &filter.content_hash {
            if field("content_hash") != Some(hash.as_str()) {
                return false;
            }
        }
        if let Some(types) = &filter.memory_types {
            let tag = field("type").unwrap_or_default();
            if !types.iter().any(|t| t.tag() == tag) {
                return false;
            }
        }
        if let Some(agent_id) = &filter.agent_id {
            if field("agent_id") != Some(agent_id.as_str()) {
                return false;
            }
        }
        if let Some(source) = &filter.source {
            if field("source") != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(status) = &filter.embedding_status {
            if field("embedding_status") != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(after) = filter.ts_after {
            let ts = payload.get("ts").and_then(Value::as_i64).unwrap_or(0);
            if ts <= after {
                return false;
            }
        }
        true
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, collection: Collection, _dim: u64) -> Result<()> {
        self.check_online()?;
        self.collections.lock().entry(collection).or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: Uuid,
        vector: Vec<f32>,
        payload: Map<String, Value>,
    ) -> Result<()> {
        self.check_online()?;
        self.collections
            .lock()
            .entry(collection)
            .or_default()
            .insert(id, InMemoryPoint { vector, payload });
        Ok(())
    }

    async fn scroll(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<StoredPoint>> {
        self.check_online()?;
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .map(|points| {
                points
                    .iter()
                    .filter(|(_, point)| Self::matches(filter, &point.payload))
                    .take(limit)
                    .map(|(id, point)| StoredPoint {
                        id: *id,
                        payload: point.payload.clone(),
                        vector: with_vectors.then(|| point.vector.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn scroll_recent(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        self.check_online()?;
        let mut matched: Vec<StoredPoint> = self
            .collections
            .lock()
            .get(&collection)
            .map(|points| {
                points
                    .iter()
                    .filter(|(_, point)| Self::matches(filter, &point.payload))
                    .map(|(id, point)| StoredPoint {
                        id: *id,
                        payload: point.payload.clone(),
                        vector: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by_key(|point| {
            std::cmp::Reverse(point.payload.get("ts").and_then(Value::as_i64).unwrap_or(0))
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn search(
        &self,
        collection: Collection,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        self.check_online()?;
        let mut scored: Vec<ScoredPoint> = self
            .collections
            .lock()
            .get(&collection)
            .map(|points| {
                points
                    .iter()
                    .filter(|(_, point)| Self::matches(filter, &point.payload))
                    .map(|(id, point)| ScoredPoint {
                        id: *id,
                        score: cosine(vector, &point.vector),
                        payload: point.payload.clone(),
                    })
                    .filter(|hit| score_threshold.is_none_or(|t| hit.score >= t))
                    .collect()
            })
            .unwrap_or_default();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn set_payload(
        &self,
        collection: Collection,
        id: Uuid,
        updates: Map<String, Value>,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let point = collections
            .get_mut(&collection)
            .and_then(|points| points.get_mut(&id))
            .ok_or(Error::PointNotFound {
                collection,
                point_id: id,
            })?;
        for (key, value) in updates {
            point.payload.insert(key, value);
        }
        Ok(())
    }

    async fn update_vector(
        &self,
        collection: Collection,
        id: Uuid,
        vector: Vec<f32>,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let point = collections
            .get_mut(&collection)
            .and_then(|points| points.get_mut(&id))
            .ok_or(Error::PointNotFound {
                collection,
                point_id: id,
            })?;
        point.vector = vector;
        Ok(())
    }

    async fn create_payload_indexes(&self, _collection: Collection) -> Result<()> {
        self.check_online()
    }

    async fn enable_quantization(&self, _collection: Collection) -> Result<()> {
        self.check_online()
    }

    async fn count(&self, collection: Collection, filter: &PointFilter) -> Result<u64> {
        self.check_online()?;
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .map(|points| {
                points
                    .values()
                    .filter(|point| Self::matches(filter, &point.payload))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn healthy(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

/// Deterministic embedder: identical text yields an identical unit
/// vector, so exact-match retrieval scores 1.0. Switchable to a failing
/// mode that mimics a timeout.
pub struct MockEmbedder {
    dim: usize,
    failing: AtomicBool,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(clippy::cast_precision_loss)]
    fn vector_for(&self, text: &str) -> Vec<f32> {
        // xorshift stream seeded from the text bytes.
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for byte in text.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u64::from(byte));
        }
        let mut vector = Vec::with_capacity(self.dim);
        for _ in 0..self.dim {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let component = ((seed % 2000) as f32 / 1000.0) - 1.0;
            vector.push(component);
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for component in &mut vector {
                *component /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String], _kind: ModelKind) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::EmbeddingTimeout(std::time::Duration::from_secs(1)));
        }
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn model_id(&self, kind: ModelKind) -> String {
        match kind {
            ModelKind::Prose => "mock-prose".to_string(),
            ModelKind::Code => "mock-code".to_string(),
        }
    }

    async fn healthy(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

/// Classifier double returning a canned verdict.
pub struct MockClassifier {
    pub verdict_type: MemoryType,
    pub confidence: f64,
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(
        &self,
        _content: &str,
        _collection: Collection,
        current_type: MemoryType,
    ) -> Result<ClassificationResult> {
        Ok(ClassificationResult {
            classified_type: self.verdict_type,
            confidence: self.confidence,
            provider_used: "mock".to_string(),
            reasoning: "canned verdict".to_string(),
            was_reclassified: self.verdict_type != current_type,
            model_name: "mock-model".to_string(),
            input_tokens: Some(10),
            output_tokens: Some(5),
        })
    }
}

/// Config rooted in a temp directory, matching the mock embedder's
/// dimension.
#[must_use]
pub fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::from_env();
    config.install_dir = root.to_path_buf();
    config.audit_dir = root.to_path_buf();
    config.lock_file = root.join("backfill.lock");
    config.vector_dim = 64;
    config
}

/// A minimal valid store request for project `proj` and session `s1`.
#[must_use]
pub fn store_request(content: &str, memory_type: MemoryType) -> StoreRequest {
    StoreRequest::new(content, "/srv/proj", memory_type, "post_tool_capture", "s1")
        .with_group_id("proj")
}
