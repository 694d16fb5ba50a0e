//! Detached background entry points.
//!
//! `store-worker` is the forked child of every write-side hook: it reads
//! one [`StoreRequest`] from stdin and runs the full storage pipeline
//! under the `HOOK_TIMEOUT` bound. `metrics-push` ships one rendered
//! exposition snapshot to the push gateway, fire-and-forget.

use engram_core::embedding::HttpEmbedder;
use engram_core::observability::{activity, metrics};
use engram_core::vector::qdrant::QdrantStore;
use engram_core::{get_config, Collection, MemoryStorage, StoreRequest, StoreStatus, VectorStore};
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Run the storage pipeline for one request read from stdin.
///
/// Exit 1 only on an unambiguous unrecoverable failure in this
/// capture-only path; the host treats either exit code as continue.
pub async fn store_worker() -> ExitCode {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() || raw.trim().is_empty() {
        warn!("store worker got no payload");
        return ExitCode::SUCCESS;
    }
    let request: StoreRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "store worker payload unparseable");
            return ExitCode::SUCCESS;
        }
    };

    let config = get_config();
    let timeout = config.hook_timeout;
    match tokio::time::timeout(timeout, run_store(request)).await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "store worker failed");
            metrics::record_failure("store_worker", e.code());
            ExitCode::FAILURE
        }
        Err(_) => {
            // Longer work ends with a queue entry, not a hang; by this
            // point the storage core has already parked anything slow.
            error!(timeout_secs = timeout.as_secs(), "store worker timed out");
            metrics::record_failure("store_worker", "timeout");
            ExitCode::FAILURE
        }
    }
}

async fn run_store(request: StoreRequest) -> engram_core::Result<()> {
    let config = get_config();
    let store = Arc::new(QdrantStore::connect(&config)?);
    let embedder = Arc::new(HttpEmbedder::new(&config)?);

    for collection in Collection::ALL {
        if let Err(e) = store.ensure_collection(collection, config.vector_dim).await {
            warn!(collection = collection.name(), error = %e, "ensure_collection failed");
        }
    }

    let storage = MemoryStorage::new(store, embedder, Arc::clone(&config));
    let source_hook = request.source_hook.clone();
    let outcome = storage.store_memory(request).await?;

    match outcome.status {
        StoreStatus::Stored => activity::log_activity(
            &config,
            &format!(
                "Stored memory from {source_hook} ({})",
                outcome
                    .memory_id
                    .map(|id| id.to_string())
                    .unwrap_or_default()
            ),
        ),
        StoreStatus::Blocked => activity::log_activity(
            &config,
            &format!("Blocked capture from {source_hook}: content contained a secret"),
        ),
        StoreStatus::Queued => activity::log_activity(
            &config,
            &format!("Queued capture from {source_hook} for retry (store unavailable)"),
        ),
        StoreStatus::Duplicate => {}
    }

    info!(status = outcome.status.as_str(), "store worker complete");
    push_metrics_detached();
    Ok(())
}

/// Ship one metrics snapshot read from stdin to the push gateway.
pub async fn metrics_push() -> ExitCode {
    let config = get_config();
    let Some(gateway) = config.push_gateway_url.clone() else {
        return ExitCode::SUCCESS;
    };
    let mut body = String::new();
    if std::io::stdin().read_to_string(&mut body).is_err() || body.trim().is_empty() {
        return ExitCode::SUCCESS;
    }
    if let Err(e) = metrics::push_to_gateway(&gateway, "engram_hooks", body).await {
        warn!(error = %e, "metrics push failed");
    }
    ExitCode::SUCCESS
}

/// Fork a detached `metrics-push` child carrying the current registry
/// snapshot, so the hook itself never waits on the gateway.
pub fn push_metrics_detached() {
    let config = get_config();
    if config.push_gateway_url.is_none() {
        return;
    }
    let rendered = metrics::render();
    if rendered.is_empty() {
        return;
    }
    let trace_id = engram_core::observability::trace::current_trace_id();
    engram_core::hooks::spawn_detached_worker("metrics-push", &rendered, &trace_id);
}
