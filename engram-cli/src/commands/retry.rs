//! `engram retry-queue`: drain the pending queue through the storage
//! core.
//!
//! Lock conflict exits 1 immediately; a second processor never waits for
//! the first. Success or partial success exits 0. An unexpected error
//! while processing an entry is logged and the entry left untouched, so
//! a processor bug cannot silently exhaust retries across the queue.

use super::Clients;
use clap::Args;
use engram_core::queue::{QueueLock, RetryQueue};
use engram_core::{Error, MemoryStorage};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Args)]
pub struct RetryArgs {
    /// Also process entries past max_retries
    #[arg(long)]
    pub force: bool,

    /// Show what would be processed without storing
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum entries to process
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    /// Print queue statistics and exit
    #[arg(long)]
    pub stats: bool,

    /// Remove every entry from the queue
    #[arg(long)]
    pub clear: bool,
}

pub async fn run(args: RetryArgs) -> anyhow::Result<ExitCode> {
    let config = engram_core::get_config();
    let queue = RetryQueue::new(&config);

    if args.stats {
        let stats = queue.stats()?;
        println!("Queue statistics:");
        println!("  Total items: {}", stats.total_items);
        println!("  Ready for retry: {}", stats.ready_for_retry);
        println!("  Awaiting backoff: {}", stats.awaiting_backoff);
        println!("  Exhausted (max retries): {}", stats.exhausted);
        println!("  By failure reason:");
        for (reason, count) in &stats.by_failure_reason {
            println!("    {reason}: {count}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Single-writer: a concurrent processor owns the queue, get out of
    // its way immediately.
    let _lock = match QueueLock::acquire(&config) {
        Ok(lock) => lock,
        Err(Error::QueueLocked) => {
            eprintln!("retry queue is locked by another processor");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    if args.clear {
        let removed = queue.clear()?;
        println!("Cleared {removed} entries");
        return Ok(ExitCode::SUCCESS);
    }

    let pending = queue.get_pending(args.limit, args.force)?;
    if pending.is_empty() {
        println!("Queue empty, nothing to process");
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        for entry in &pending {
            println!(
                "would retry {} (reason: {}, attempt {}/{}): {} chars of {}",
                entry.id,
                entry.failure_reason,
                entry.retry_count,
                entry.max_retries,
                entry.memory_data.content.len(),
                entry.memory_data.memory_type,
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let clients = Clients::connect().await?;
    let storage = MemoryStorage::new(
        clients.store.clone(),
        clients.embedder.clone(),
        Arc::clone(&clients.config),
    );

    let mut succeeded = 0;
    let mut failed = 0;
    let mut dead_lettered = 0;

    for entry in pending {
        // The direct path surfaces transport errors instead of
        // self-queuing, so backoff and DLQ accounting happen here.
        match storage.store_memory_direct(&entry.memory_data).await {
            Ok(outcome) => {
                // Stored, duplicate and blocked are all terminal for the
                // entry; a blocked retry must not loop forever either.
                queue.dequeue(entry.id)?;
                succeeded += 1;
                info!(entry_id = %entry.id, status = outcome.status.as_str(), "entry processed");
            }
            Err(e) if e.is_recoverable() => {
                failed += 1;
                if entry.retry_count + 1 >= entry.max_retries {
                    queue.move_to_dlq(&entry)?;
                    dead_lettered += 1;
                } else {
                    queue.mark_failed(entry.id)?;
                }
                warn!(entry_id = %entry.id, error = %e, "retryable failure");
            }
            Err(e) => {
                // Unexpected error: likely a bug. Log loudly, leave the
                // entry as-is so the bug cannot burn its retries.
                failed += 1;
                error!(entry_id = %entry.id, error = %e, "unexpected error processing entry");
            }
        }
    }

    println!("Processing complete:");
    println!("  Succeeded: {succeeded}");
    println!("  Failed: {failed}");
    println!("  Moved to DLQ: {dead_lettered}");

    // Partial success still exits 0: the remaining entries will retry.
    Ok(ExitCode::SUCCESS)
}
