//! Long-lived daemons: the classification worker and the trace flusher.
//!
//! Both coordinate with the rest of the system exclusively through the
//! vector store and the on-disk queues, install graceful shutdown
//! handlers, and write liveness heartbeats for external health checks.

use clap::{Parser, Subcommand};
use engram_core::observability::init_logging;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

mod classifier_worker;
mod trace_flush;

#[derive(Parser)]
#[command(name = "engram-daemon")]
#[command(about = "Long-lived workers for the Engram memory layer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: DaemonCommand,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Classification worker: drain the classification queue through the
    /// LLM and write refined types back to the store
    Classifier {
        /// Process one batch and exit
        #[arg(long)]
        once: bool,
    },
    /// Trace flusher: drain the span buffer into the tracing backend
    TraceFlush {
        /// Drain once and exit
        #[arg(long)]
        once: bool,
    },
}

/// Set a shared flag on SIGTERM/SIGINT; workers finish the in-flight
/// batch and exit.
fn install_shutdown_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        for kind in [SignalKind::terminate(), SignalKind::interrupt()] {
            let flag = Arc::clone(&flag);
            if let Ok(mut stream) = signal(kind) {
                tokio::spawn(async move {
                    stream.recv().await;
                    info!("shutdown signal received");
                    flag.store(true, Ordering::SeqCst);
                });
            }
        }
    }

    flag
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");
    let cli = Cli::parse();
    let shutdown = install_shutdown_handler();

    match cli.command {
        DaemonCommand::Classifier { once } => {
            classifier_worker::run(&shutdown, once).await?;
        }
        DaemonCommand::TraceFlush { once } => {
            trace_flush::run(&shutdown, once).await?;
        }
    }
    Ok(())
}
