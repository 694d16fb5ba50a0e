//! `engram status`: sizes, queues, warnings.

use super::Clients;
use engram_core::queue::{ClassificationQueue, RetryQueue};
use engram_core::vector::PointFilter;
use engram_core::{Collection, VectorStore};
use std::process::ExitCode;

/// Collections beyond this point count get a size warning.
const COLLECTION_WARN_THRESHOLD: u64 = 100_000;

pub async fn run() -> anyhow::Result<ExitCode> {
    let clients = Clients::connect().await?;

    println!("Collections:");
    for collection in Collection::ALL {
        match clients
            .store
            .count(collection, &PointFilter::default())
            .await
        {
            Ok(count) => {
                engram_core::observability::metrics::set_collection_size(
                    collection.name(),
                    "all",
                    count,
                );
                let warning = if count > COLLECTION_WARN_THRESHOLD {
                    "  ⚠ over size threshold"
                } else {
                    ""
                };
                println!("  {collection}: {count} points{warning}");
            }
            Err(e) => println!("  {collection}: unavailable ({e})"),
        }
    }

    let retry = RetryQueue::new(&clients.config);
    match retry.stats() {
        Ok(stats) => {
            engram_core::observability::metrics::set_queue_depth("retry", stats.total_items);
            println!("\nRetry queue:");
            println!("  total: {}", stats.total_items);
            println!("  ready: {}", stats.ready_for_retry);
            println!("  awaiting backoff: {}", stats.awaiting_backoff);
            println!("  exhausted: {}", stats.exhausted);
            if !stats.by_failure_reason.is_empty() {
                println!("  by failure reason:");
                for (reason, count) in &stats.by_failure_reason {
                    println!("    {reason}: {count}");
                }
            }
        }
        Err(e) => println!("\nRetry queue unavailable: {e}"),
    }

    let classification = ClassificationQueue::new(&clients.config);
    match classification.size() {
        Ok(depth) => println!("\nClassification queue depth: {depth}"),
        Err(e) => println!("\nClassification queue unavailable: {e}"),
    }

    Ok(ExitCode::SUCCESS)
}
