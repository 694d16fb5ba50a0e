//! Durable retry queue for failed memory writes.
//!
//! Append-only newline-delimited JSON at
//! `$INSTALL_DIR/queue/pending_queue.jsonl`. Hooks append concurrently
//! (single `O_APPEND` write per entry); the processor is single-writer,
//! serialized by a non-blocking advisory file lock. Entries past
//! `max_retries` move to the dead-letter file and are never auto-retried.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::StoreRequest;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: i64 = 30;

/// One queued write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub memory_data: StoreRequest,
    pub failure_reason: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: DateTime<Utc>,
}

impl RetryEntry {
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}

/// Aggregate queue state for `--stats`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_items: usize,
    pub ready_for_retry: usize,
    pub awaiting_backoff: usize,
    pub exhausted: usize,
    pub by_failure_reason: HashMap<String, usize>,
}

/// Exclusive, non-blocking processor lock. Held for the lifetime of the
/// value; conflict means a concurrent processor already owns the queue.
pub struct QueueLock {
    _file: File,
    path: PathBuf,
}

impl QueueLock {
    /// Try to take the lock. [`Error::QueueLocked`] on conflict; callers
    /// exit immediately rather than wait.
    pub fn acquire(config: &Config) -> Result<Self> {
        let path = config.lock_file.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| Error::QueueLocked)?;
        Ok(Self { _file: file, path })
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// The pending queue plus its dead-letter tier.
pub struct RetryQueue {
    queue_file: PathBuf,
    dlq_file: PathBuf,
}

impl RetryQueue {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            queue_file: config.retry_queue_file(),
            dlq_file: config.retry_dlq_file(),
        }
    }

    /// Append a failed write. `immediate` skips the initial backoff (used
    /// by tests and `--force` reprocessing).
    pub fn enqueue(
        &self,
        request: StoreRequest,
        failure_reason: &str,
        immediate: bool,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let entry = RetryEntry {
            id: Uuid::new_v4(),
            enqueued_at: now,
            memory_data: request,
            failure_reason: failure_reason.to_string(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: if immediate {
                now
            } else {
                now + chrono::Duration::seconds(BASE_BACKOFF_SECS)
            },
        };
        self.append(&self.queue_file, &entry)?;
        info!(
            entry_id = %entry.id,
            failure_reason,
            "write parked in retry queue"
        );
        Ok(entry.id)
    }

    /// Entries ready to process. `include_exhausted` also returns entries
    /// past `max_retries` (the `--force` path).
    pub fn get_pending(&self, limit: usize, include_exhausted: bool) -> Result<Vec<RetryEntry>> {
        let now = Utc::now();
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|entry| {
                entry.is_ready(now) && (include_exhausted || !entry.is_exhausted())
            })
            .take(limit)
            .collect())
    }

    /// Remove an entry after successful processing.
    pub fn dequeue(&self, id: Uuid) -> Result<()> {
        self.rewrite(|entry| entry.id != id)
    }

    /// Record a failed attempt: bump the count and reschedule with
    /// exponential backoff (30 s × 2^retry_count).
    pub fn mark_failed(&self, id: Uuid) -> Result<()> {
        let mut entries = self.read_all()?;
        for entry in &mut entries {
            if entry.id == id {
                entry.retry_count += 1;
                let backoff = BASE_BACKOFF_SECS.saturating_mul(1 << entry.retry_count.min(16));
                entry.next_retry_at = Utc::now() + chrono::Duration::seconds(backoff);
            }
        }
        self.write_all(&entries)
    }

    /// Move an exhausted entry to the dead-letter file.
    pub fn move_to_dlq(&self, entry: &RetryEntry) -> Result<()> {
        let mut dead = serde_json::to_value(entry)?;
        if let Some(map) = dead.as_object_mut() {
            map.insert(
                "moved_to_dlq_at".to_string(),
                serde_json::json!(Utc::now()),
            );
        }
        self.append_raw(&self.dlq_file, &dead)?;
        self.dequeue(entry.id)?;
        warn!(entry_id = %entry.id, "entry moved to dead-letter queue");
        Ok(())
    }

    /// Drop every entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let count = self.read_all()?.len();
        self.write_all(&[])?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let entries = self.read_all()?;
        let now = Utc::now();
        let mut by_failure_reason: HashMap<String, usize> = HashMap::new();
        let mut ready = 0;
        let mut waiting = 0;
        let mut exhausted = 0;
        for entry in &entries {
            *by_failure_reason
                .entry(entry.failure_reason.clone())
                .or_default() += 1;
            if entry.is_exhausted() {
                exhausted += 1;
            } else if entry.is_ready(now) {
                ready += 1;
            } else {
                waiting += 1;
            }
        }
        Ok(QueueStats {
            total_items: entries.len(),
            ready_for_retry: ready,
            awaiting_backoff: waiting,
            exhausted,
            by_failure_reason,
        })
    }

    /// Every entry regardless of schedule, in file order.
    pub fn entries(&self) -> Result<Vec<RetryEntry>> {
        self.read_all()
    }

    /// Queue depth (gauge feed).
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read_all(&self) -> Result<Vec<RetryEntry>> {
        let content = match std::fs::read_to_string(&self.queue_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RetryEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A corrupt line is dropped, not fatal: the queue must
                // keep draining around it.
                Err(e) => warn!(error = %e, "skipping corrupt retry queue line"),
            }
        }
        Ok(entries)
    }

    fn write_all(&self, entries: &[RetryEntry]) -> Result<()> {
        if let Some(parent) = self.queue_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.queue_file.with_extension("jsonl.tmp");
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }
        std::fs::write(&tmp, buffer)?;
        std::fs::rename(&tmp, &self.queue_file)?;
        Ok(())
    }

    fn rewrite(&self, keep: impl Fn(&RetryEntry) -> bool) -> Result<()> {
        let entries: Vec<RetryEntry> = self.read_all()?.into_iter().filter(|e| keep(e)).collect();
        self.write_all(&entries)
    }

    fn append(&self, path: &PathBuf, entry: &RetryEntry) -> Result<()> {
        self.append_raw(path, &serde_json::to_value(entry)?)
    }

    fn append_raw(&self, path: &PathBuf, value: &serde_json::Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        // One write call per line keeps concurrent appenders intact.
        file.write_all(format!("{}\n", serde_json::to_string(value)?).as_bytes())?;
        Ok(())
    }
}
