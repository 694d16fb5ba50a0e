//! Canonical write path.
//!
//! Every capture, regardless of origin, funnels through
//! [`MemoryStorage::store_memory`]: validate → scan → route → truncate →
//! dedup → embed → upsert → enqueue classification → observe. Transport
//! failures park the write in the retry queue instead of failing the
//! caller.

pub mod backfill;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::project::detect_project;
use crate::queue::{ClassificationQueue, ClassificationTask, RetryQueue};
use crate::security::{self, ScanAction};
use crate::tokens;
use crate::types::{
    content_hash, Collection, EmbeddingStatus, MemoryRecord, MemoryType, StoreOutcome,
    TruncationPolicy, SOURCE_HOOK_WHITELIST,
};
use crate::vector::{PointFilter, VectorStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Content below this length is noise, not memory.
pub const MIN_CONTENT_LEN: usize = 20;

/// Input contract of the canonical write path. Also the wire format of
/// retry-queue entries, so it must stay serde-stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub content: String,
    pub cwd: String,
    pub memory_type: MemoryType,
    pub source_hook: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<Collection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Type-specific extras carried into the payload (`file_path`,
    /// `command`, `error_message`, connector ids, …).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StoreRequest {
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        cwd: impl Into<String>,
        memory_type: MemoryType,
        source_hook: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            cwd: cwd.into(),
            memory_type,
            source_hook: source_hook.into(),
            session_id: session_id.into(),
            collection: None,
            group_id: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// The storage core, generic over its two external collaborators.
pub struct MemoryStorage {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    retry_queue: RetryQueue,
    classification_queue: ClassificationQueue,
    config: Arc<Config>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            retry_queue: RetryQueue::new(&config),
            classification_queue: ClassificationQueue::new(&config),
            store,
            embedder,
            config,
        }
    }

    /// Store one memory. Never panics, never blocks beyond the embedding
    /// timeout; the four terminal statuses are the only outcomes. On
    /// transport failure the write parks in the retry queue.
    pub async fn store_memory(&self, request: StoreRequest) -> Result<StoreOutcome> {
        match self.store_memory_direct(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_recoverable() => {
                // Transport trouble: park the write and tell the caller
                // it is queued, not lost.
                let collection = request
                    .collection
                    .unwrap_or_else(|| request.memory_type.collection());
                let source_hook = request.source_hook.clone();
                let group_id = request
                    .group_id
                    .clone()
                    .unwrap_or_else(|| detect_project(&request.cwd));
                self.retry_queue.enqueue(request, e.code(), false)?;
                metrics::record_capture(&source_hook, "queued", &group_id, collection.name());
                Ok(StoreOutcome::queued())
            }
            Err(e) => Err(e),
        }
    }

    /// The pipeline without the retry-queue fallback. Recoverable
    /// transport errors surface to the caller; the retry processor uses
    /// this so its own backoff and dead-letter accounting stay accurate.
    pub async fn store_memory_direct(&self, request: &StoreRequest) -> Result<StoreOutcome> {
        let group_id = self.validate(request)?;

        // Security scan. A scanner failure degrades to pass inside
        // `security::scan`; a hard secret stops everything here.
        let scan = security::scan(&request.content, &self.config);
        if scan.action == ScanAction::Blocked {
            warn!(
                source_hook = %request.source_hook,
                findings = scan.findings.len(),
                "capture blocked by security scan"
            );
            metrics::record_capture(&request.source_hook, "blocked", &group_id, "none");
            return Ok(StoreOutcome::blocked());
        }

        let collection = request
            .collection
            .unwrap_or_else(|| request.memory_type.collection());
        let hash = content_hash(&request.content);
        let truncated = self.apply_truncation(request, &scan.content);

        self.persist(request, &group_id, collection, &hash, truncated)
            .await
    }

    /// Batch variant: same per-record policy, one result per input, in
    /// order. A blocked or failed record never aborts its neighbors.
    pub async fn store_memories_batch(
        &self,
        requests: Vec<StoreRequest>,
    ) -> Vec<Result<StoreOutcome>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.store_memory(request).await);
        }
        results
    }

    fn validate(&self, request: &StoreRequest) -> Result<String> {
        if request.content.trim().len() < MIN_CONTENT_LEN {
            return Err(Error::Validation(format!(
                "content too short ({} chars, minimum {MIN_CONTENT_LEN})",
                request.content.trim().len()
            )));
        }
        if !SOURCE_HOOK_WHITELIST.contains(&request.source_hook.as_str()) {
            return Err(Error::Validation(format!(
                "unknown source_hook: {}",
                request.source_hook
            )));
        }
        let group_id = request
            .group_id
            .clone()
            .unwrap_or_else(|| detect_project(&request.cwd));
        if group_id.is_empty() {
            return Err(Error::Validation("group_id resolution failed".into()));
        }
        Ok(group_id)
    }

    fn apply_truncation(&self, request: &StoreRequest, content: &str) -> String {
        match request.memory_type.truncation_policy() {
            TruncationPolicy::SentenceEnd { max_tokens } => tokens::smart_end(content, max_tokens),
            TruncationPolicy::Structured { max_output_tokens } => {
                // Error contexts arrive with structured extras; fall back
                // to the ceiling when a caller sent plain text.
                match (request.extra_str("command"), request.extra_str("error_message")) {
                    (Some(command), Some(error_message)) => tokens::structured_truncate(
                        command,
                        error_message,
                        request.extra_str("output").unwrap_or_default(),
                        max_output_tokens,
                    ),
                    _ => tokens::ceiling_truncate(content),
                }
            }
            TruncationPolicy::CollectionCeiling => tokens::ceiling_truncate(content),
        }
    }

    async fn persist(
        &self,
        request: &StoreRequest,
        group_id: &str,
        collection: Collection,
        hash: &str,
        content: String,
    ) -> Result<StoreOutcome> {
        // Dedup by (group_id, content_hash, type), payload-only scroll.
        let dedup_filter = PointFilter::for_group(group_id)
            .with_content_hash(hash)
            .with_type(request.memory_type);
        let existing = self.store.scroll(collection, &dedup_filter, 1, false).await?;
        if let Some(point) = existing.first() {
            info!(memory_id = %point.id, group_id, "duplicate content, skipping upsert");
            metrics::record_dedup(group_id);
            metrics::record_capture(&request.source_hook, "duplicate", group_id, collection.name());
            return Ok(StoreOutcome::duplicate(point.id));
        }

        // Embed; final failure degrades to a zero vector the backfill
        // worker promotes later.
        let kind = request.memory_type.model_kind();
        let embed_started = std::time::Instant::now();
        let embed_result = self
            .embedder
            .embed(std::slice::from_ref(&content), kind)
            .await;
        metrics::observe_embedding_duration(embed_started.elapsed().as_secs_f64());
        let (vector, embedding_status) = match embed_result {
            Ok(mut vectors) if !vectors.is_empty() => {
                metrics::record_embedding("success");
                (vectors.swap_remove(0), EmbeddingStatus::Complete)
            }
            Ok(_) => {
                metrics::record_embedding("empty");
                (self.zero_vector(), EmbeddingStatus::Pending)
            }
            Err(e) => {
                warn!(error = %e, "embedding failed, storing pending zero vector");
                metrics::record_embedding("failure");
                (self.zero_vector(), EmbeddingStatus::Pending)
            }
        };

        let record = self.build_record(request, group_id, hash, content, embedding_status, kind);
        let point_id = record.point_id();
        let payload = record_payload(&record)?;

        self.store
            .upsert(collection, point_id, vector, payload)
            .await?;

        self.enqueue_classification(&record, collection, point_id);

        metrics::record_capture(&request.source_hook, "stored", group_id, collection.name());
        metrics::record_tokens("capture", "stored", tokens::count_tokens(&record.content));
        info!(
            memory_id = %point_id,
            collection = collection.name(),
            memory_type = %request.memory_type,
            group_id,
            "memory stored"
        );

        Ok(StoreOutcome::stored(point_id, embedding_status))
    }

    fn build_record(
        &self,
        request: &StoreRequest,
        group_id: &str,
        hash: &str,
        content: String,
        embedding_status: EmbeddingStatus,
        kind: crate::types::ModelKind,
    ) -> MemoryRecord {
        let now = Utc::now();
        let mut extra = request.extra.clone();
        extra.insert("ts".to_string(), Value::from(now.timestamp()));

        let take_str = |extra: &mut Map<String, Value>, key: &str| -> Option<String> {
            extra
                .remove(key)
                .and_then(|v| v.as_str().map(ToString::to_string))
        };
        let file_path = take_str(&mut extra, "file_path");
        let language = take_str(&mut extra, "language");
        let framework = take_str(&mut extra, "framework");
        let importance = take_str(&mut extra, "importance");
        let agent_id = take_str(&mut extra, "agent_id");
        let tags = extra.remove("tags").and_then(|v| {
            serde_json::from_value::<Vec<String>>(v).ok()
        });
        let file_references = extra
            .remove("file_references")
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok());
        let turn_number = extra
            .remove("turn_number")
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok());

        MemoryRecord {
            content,
            content_hash: hash.to_string(),
            group_id: group_id.to_string(),
            memory_type: request.memory_type,
            source_hook: request.source_hook.clone(),
            session_id: request.session_id.clone(),
            timestamp: now,
            created_at: now,
            embedding_status,
            embedding_model: self.embedder.model_id(kind),
            source_authority: request.memory_type.source_authority(),
            decay_score: 1.0,
            freshness_status: "fresh".to_string(),
            is_current: true,
            version: 1,
            file_path,
            file_references,
            language,
            framework,
            importance,
            tags,
            turn_number,
            agent_id,
            extra,
        }
    }

    fn enqueue_classification(
        &self,
        record: &MemoryRecord,
        collection: Collection,
        point_id: uuid::Uuid,
    ) {
        if !self.config.classifier_enabled {
            return;
        }
        let task = ClassificationTask {
            point_id,
            collection,
            content: ClassificationTask::capped_content(&record.content),
            current_type: record.memory_type,
            group_id: record.group_id.clone(),
            source_hook: record.source_hook.clone(),
            created_at: Utc::now(),
            session_id: Some(record.session_id.clone()),
            trace_id: std::env::var("ENGRAM_TRACE_ID").ok(),
        };
        if let Err(e) = self.classification_queue.enqueue(&task) {
            // Classification is best-effort enrichment; storage already
            // succeeded.
            warn!(error = %e, point_id = %point_id, "failed to enqueue classification task");
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.config.vector_dim as usize]
    }
}

/// Serialize a record to the flat payload map the store expects.
pub fn record_payload(record: &MemoryRecord) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Store("record did not serialize to an object".into())),
    }
}
