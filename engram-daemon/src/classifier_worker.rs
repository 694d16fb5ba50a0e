//! Classification worker loop.
//!
//! Resource limits: 5 s poll interval, 10-task batches, 4 concurrent LLM
//! calls. A task failure is logged and counted, never fatal; the refined
//! type is written back only at or above the confidence threshold.

use anyhow::Result;
use engram_core::classifier::{process_classification_task, HttpClassifier};
use engram_core::observability::{metrics, trace::touch_heartbeat};
use engram_core::queue::ClassificationQueue;
use engram_core::vector::qdrant::QdrantStore;
use engram_core::{get_config, VectorStore};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const BATCH_SIZE: usize = 10;
const MAX_CONCURRENT_TASKS: usize = 4;

pub async fn run(shutdown: &AtomicBool, once: bool) -> Result<()> {
    let config = get_config();
    let queue = ClassificationQueue::new(&config);
    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::connect(&config)?);
    let classifier = Arc::new(HttpClassifier::new(&config)?);
    let heartbeat = config.install_dir.join("classifier.heartbeat");

    info!(
        poll_secs = POLL_INTERVAL.as_secs(),
        batch_size = BATCH_SIZE,
        max_concurrent = MAX_CONCURRENT_TASKS,
        "classification worker started"
    );

    loop {
        touch_heartbeat(&heartbeat);

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !config.classifier_enabled {
            if once {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        let processed = process_batch(&queue, classifier.as_ref(), store.as_ref()).await?;
        if let Ok(depth) = queue.size() {
            metrics::set_queue_depth("classification", depth);
        }

        if once {
            info!(processed, "single batch complete");
            break;
        }
        if processed == 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    info!("classification worker stopped");
    Ok(())
}

/// Drain one batch with bounded concurrency. Returns tasks taken.
async fn process_batch(
    queue: &ClassificationQueue,
    classifier: &HttpClassifier,
    store: &dyn VectorStore,
) -> Result<usize> {
    let tasks = queue.dequeue_batch(BATCH_SIZE)?;
    if tasks.is_empty() {
        return Ok(0);
    }

    let config = get_config();
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TASKS));
    let total = tasks.len();

    let results = join_all(tasks.iter().map(|task| {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        async move {
            let _permit = semaphore.acquire().await;
            process_classification_task(task, classifier, store, &config).await
        }
    }))
    .await;

    let mut succeeded = 0;
    for (task, result) in tasks.iter().zip(results) {
        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                error!(
                    point_id = %task.point_id,
                    error = %e,
                    "classification task failed"
                );
                metrics::record_failure("classifier_worker", e.code());
            }
        }
    }
    info!(total, succeeded, failed = total - succeeded, "batch processed");
    Ok(total)
}
