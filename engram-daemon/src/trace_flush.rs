//! Trace flush worker: drain the span buffer into the tracing backend.
//!
//! Spans that fail to ship stay in the buffer for the next pass; the
//! emit-side byte cap keeps the buffer bounded even when the backend is
//! down for a long time.

use anyhow::Result;
use engram_core::get_config;
use engram_core::observability::trace::{buffered_spans, flush_span, touch_heartbeat, TraceSpan};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(shutdown: &AtomicBool, once: bool) -> Result<()> {
    let config = get_config();
    let heartbeat = config.install_dir.join("trace-flush.heartbeat");

    let Some(backend_url) = config.trace_backend_url.clone() else {
        info!("no trace backend configured, flusher idle");
        return Ok(());
    };
    info!(backend = backend_url, "trace flush worker started");

    loop {
        touch_heartbeat(&heartbeat);
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let flushed = flush_pass(&backend_url).await;
        if once {
            info!(flushed, "single flush pass complete");
            break;
        }
        if flushed == 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    info!("trace flush worker stopped");
    Ok(())
}

/// One pass over the buffer, oldest first. Returns spans shipped.
async fn flush_pass(backend_url: &str) -> usize {
    let config = get_config();
    let mut flushed = 0;

    for path in buffered_spans(&config) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let span: TraceSpan = match serde_json::from_slice(&bytes) {
            Ok(span) => span,
            Err(e) => {
                // A corrupt span can never ship; drop it.
                warn!(path = %path.display(), error = %e, "dropping corrupt span file");
                let _ = std::fs::remove_file(&path);
                continue;
            }
        };

        match flush_span(backend_url, &span).await {
            Ok(()) => {
                let _ = std::fs::remove_file(&path);
                flushed += 1;
            }
            Err(e) => {
                // Backend down: keep the file, stop the pass, retry at
                // the next poll.
                warn!(error = %e, "span flush failed, backing off");
                break;
            }
        }
    }
    flushed
}
