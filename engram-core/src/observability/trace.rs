//! Disk-backed trace span buffer.
//!
//! Hooks mint one trace id per user turn and hand it to detached workers
//! through the `ENGRAM_TRACE_ID` environment variable. Every component
//! writes spans as single JSON files into the buffer directory; the flush
//! daemon drains them into the tracing backend and keeps the buffer under
//! a byte cap by evicting the oldest files first.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Environment variable carrying the per-turn trace id across process
/// boundaries.
pub const TRACE_ID_ENV: &str = "ENGRAM_TRACE_ID";

/// One span, as buffered on disk and shipped to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub trace_id: String,
    pub span_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl TraceSpan {
    /// New span for the current trace (from the environment, or a fresh
    /// trace id when none was propagated).
    #[must_use]
    pub fn begin(name: &str) -> Self {
        let now = Utc::now();
        Self {
            trace_id: current_trace_id(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            name: name.to_string(),
            start_time: now,
            end_time: now,
            session_id: None,
            project_id: None,
            model: None,
            input_tokens: None,
            output_tokens: None,
            ok: true,
            input: Value::Null,
            output: Value::Null,
            metadata: Value::Null,
        }
    }

    /// Close the span at the real wall-clock end time.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.end_time = Utc::now();
        self
    }
}

/// The trace id for this turn: inherited via the environment, or minted.
#[must_use]
pub fn current_trace_id() -> String {
    std::env::var(TRACE_ID_ENV).unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// Mint a fresh trace id for a new user turn.
#[must_use]
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Buffer a span on disk. Best-effort: a failed write warns and drops the
/// span rather than affecting the caller.
pub fn emit_span(config: &Config, span: &TraceSpan) {
    let dir = config.trace_buffer_dir();
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let name = format!(
        "{:020}-{}.json",
        span.start_time.timestamp_nanos_opt().unwrap_or_default(),
        span.span_id
    );
    match serde_json::to_vec(span) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(dir.join(name), bytes) {
                warn!(error = %e, "failed to buffer trace span");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize trace span"),
    }
    evict_over_cap(&dir, config.trace_buffer_max_bytes);
}

/// List buffered span files, oldest first.
pub fn buffered_spans(config: &Config) -> Vec<PathBuf> {
    let dir = config.trace_buffer_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// Drop oldest files until the buffer is back under `max_bytes`.
fn evict_over_cap(dir: &Path, max_bytes: u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<(PathBuf, u64)> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            Some((e.path(), meta.len()))
        })
        .collect();
    let total: u64 = files.iter().map(|(_, size)| size).sum();
    if total <= max_bytes {
        return;
    }
    // Lexicographic order is chronological order (nanos prefix).
    files.sort();
    let mut excess = total - max_bytes;
    for (path, size) in files {
        if excess == 0 {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            excess = excess.saturating_sub(size);
        }
    }
}

/// POST one span to the tracing backend.
pub async fn flush_span(backend_url: &str, span: &TraceSpan) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;
    let response = client
        .post(format!("{backend_url}/api/spans"))
        .json(span)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("trace backend returned {}", response.status()))
    }
}

/// Touch a heartbeat file for external liveness checks.
pub fn touch_heartbeat(path: &Path) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, chrono::Utc::now().to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::from_env();
        config.install_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn spans_buffer_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        for name in ["first", "second", "third"] {
            let span = TraceSpan::begin(name).finish();
            emit_span(&config, &span);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let files = buffered_spans(&config);
        assert_eq!(files.len(), 3);
        let first: TraceSpan =
            serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
        assert_eq!(first.name, "first");
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.trace_buffer_max_bytes = 600;

        for i in 0..10 {
            let mut span = TraceSpan::begin(&format!("span-{i}"));
            span.metadata = serde_json::json!({"padding": "x".repeat(200)});
            emit_span(&config, &span.finish());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let files = buffered_spans(&config);
        assert!(files.len() < 10, "old spans evicted");
        let newest: TraceSpan =
            serde_json::from_slice(&std::fs::read(files.last().unwrap()).unwrap()).unwrap();
        assert_eq!(newest.name, "span-9");
    }

    #[test]
    fn heartbeat_writes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.heartbeat");
        touch_heartbeat(&path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&content).is_ok());
    }
}
