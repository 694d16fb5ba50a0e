//! Direct-vector backfill: promote `pending` zero-vector records.
//!
//! Uses the store's vector-update primitive, never a re-upsert, so the
//! point id is untouched; a `set_payload` flips the status to complete.
//! Per-point failures are skipped and counted, not fatal.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::queue::ClassificationTask;
use crate::types::{Collection, EmbeddingStatus, MemoryType, ModelKind};
use crate::vector::{PointFilter, VectorStore};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one backfill sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillStats {
    pub promoted: usize,
    pub failed: usize,
    pub pending_seen: usize,
}

/// Sweep one collection for pending records and promote them in batches.
/// `dry_run` only counts.
pub async fn backfill_pending(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    collection: Collection,
    batch_size: usize,
    dry_run: bool,
) -> Result<BackfillStats> {
    let filter = PointFilter {
        embedding_status: Some("pending".to_string()),
        ..PointFilter::default()
    };
    let mut stats = BackfillStats::default();
    // Failed (or dry-run) points stay pending; remember them so one bad
    // point cannot spin the scroll loop forever.
    let mut skipped: HashSet<Uuid> = HashSet::new();

    loop {
        let points = store
            .scroll(collection, &filter, batch_size + skipped.len(), false)
            .await?;
        let fresh: Vec<_> = points
            .into_iter()
            .filter(|point| !skipped.contains(&point.id))
            .take(batch_size)
            .collect();
        if fresh.is_empty() {
            break;
        }

        for point in fresh {
            stats.pending_seen += 1;
            if dry_run {
                skipped.insert(point.id);
                continue;
            }
            match promote(store, embedder, collection, point.id, &point.payload).await {
                Ok(()) => stats.promoted += 1,
                Err(e) => {
                    stats.failed += 1;
                    skipped.insert(point.id);
                    warn!(point_id = %point.id, error = %e, "backfill failed for point");
                }
            }
        }
    }
    Ok(stats)
}

async fn promote(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    collection: Collection,
    id: Uuid,
    payload: &Map<String, Value>,
) -> Result<()> {
    let content = payload
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let capped = ClassificationTask::capped_content(content);

    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .and_then(|tag| MemoryType::from_str(tag).ok())
        .map_or(ModelKind::Prose, MemoryType::model_kind);

    let mut vectors = embedder.embed(std::slice::from_ref(&capped), kind).await?;
    if vectors.is_empty() {
        return Err(crate::error::Error::Embedding(
            "service returned no vectors".into(),
        ));
    }
    let vector = vectors.swap_remove(0);

    store.update_vector(collection, id, vector).await?;

    let mut updates = Map::new();
    updates.insert(
        "embedding_status".to_string(),
        json!(EmbeddingStatus::Complete),
    );
    store.set_payload(collection, id, updates).await?;

    info!(point_id = %id, collection = collection.name(), "pending vector promoted");
    Ok(())
}
