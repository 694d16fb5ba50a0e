//! Typed operations over the external vector database.
//!
//! [`VectorStore`] is the seam between the memory layer and the store; the
//! production implementation is the Qdrant adapter in [`qdrant`], tests
//! plug in an in-memory implementation.

pub mod qdrant;

use crate::error::Result;
use crate::types::{Collection, MemoryType};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Conjunctive payload filter. Every populated field becomes a `must`
/// condition.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    pub group_id: Option<String>,
    pub content_hash: Option<String>,
    pub memory_types: Option<Vec<MemoryType>>,
    pub agent_id: Option<String>,
    pub source: Option<String>,
    pub embedding_status: Option<String>,
    /// Unix-seconds lower bound on the numeric `ts` payload field.
    pub ts_after: Option<i64>,
}

impl PointFilter {
    #[must_use]
    pub fn for_group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_types = Some(vec![memory_type]);
        self
    }

    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.group_id.is_none()
            && self.content_hash.is_none()
            && self.memory_types.is_none()
            && self.agent_id.is_none()
            && self.source.is_none()
            && self.embedding_status.is_none()
            && self.ts_after.is_none()
    }
}

/// A point returned by scroll (no similarity score).
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: Uuid,
    pub payload: Map<String, Value>,
    /// Present only when the caller asked for vectors.
    pub vector: Option<Vec<f32>>,
}

/// A point returned by ANN search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Everything the memory layer needs from the vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing: cosine distance, fixed dimension.
    async fn ensure_collection(&self, collection: Collection, dim: u64) -> Result<()>;

    /// Idempotent point write.
    async fn upsert(
        &self,
        collection: Collection,
        id: Uuid,
        vector: Vec<f32>,
        payload: Map<String, Value>,
    ) -> Result<()>;

    /// Filtered scroll, payload only (`with_vectors` pulls vectors too,
    /// off the hot path).
    async fn scroll(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<StoredPoint>>;

    /// Filtered scroll ordered by the numeric `ts` payload field,
    /// newest first. Used where semantic ranking is undesired.
    async fn scroll_recent(
        &self,
        collection: Collection,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>>;

    /// Filtered ANN search.
    async fn search(
        &self,
        collection: Collection,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Merge payload keys into an existing point.
    async fn set_payload(
        &self,
        collection: Collection,
        id: Uuid,
        updates: Map<String, Value>,
    ) -> Result<()>;

    /// Replace a point's vector without rewriting its payload.
    async fn update_vector(&self, collection: Collection, id: Uuid, vector: Vec<f32>)
        -> Result<()>;

    /// Payload indexes for tenancy and recency (`group_id`/`source` as
    /// tenant keyword indexes, `ts` as integer).
    async fn create_payload_indexes(&self, collection: Collection) -> Result<()>;

    /// Scalar int8 quantization, `quantile=0.99`, `always_ram=true`.
    async fn enable_quantization(&self, collection: Collection) -> Result<()>;

    /// Point count matching a filter.
    async fn count(&self, collection: Collection, filter: &PointFilter) -> Result<u64>;

    /// Cheap liveness probe.
    async fn healthy(&self) -> bool;
}
