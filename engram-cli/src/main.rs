//! Operator CLI: search, manual capture, status, and the maintenance
//! scripts (retry queue, vector backfill, quantization, HNSW tenancy,
//! backup).
//!
//! Exit codes: 0 success or partial success, 1 fatal errors (lock
//! conflict, corrupt state, unreachable store), 2 argument validation
//! (clap's own convention).

use clap::{Parser, Subcommand};
use engram_core::observability::init_logging;
use std::process::ExitCode;

mod commands;

use commands::{backfill, backup, maintenance, retry, save, search, status};

#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "Operator CLI for the Engram memory layer")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Semantic search across memory collections
    Search(search::SearchArgs),
    /// Store a memory by hand
    SaveMemory(save::SaveArgs),
    /// Collection sizes, queue depths and threshold warnings
    Status,
    /// Process the retry queue for failed writes
    RetryQueue(retry::RetryArgs),
    /// Embed and promote records stored with pending zero vectors
    BackfillVectors(backfill::BackfillArgs),
    /// Enable int8 scalar quantization on the collections
    EnableQuantization(maintenance::QuantizationArgs),
    /// Create tenant-aware payload indexes for per-project HNSW
    OptimizeHnsw(maintenance::HnswArgs),
    /// Snapshot collections (and optionally logs) to a backup tree
    Backup(backup::BackupArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "info" });

    let result = match cli.command {
        Commands::Search(args) => search::run(args).await,
        Commands::SaveMemory(args) => save::run(args).await,
        Commands::Status => status::run().await,
        Commands::RetryQueue(args) => retry::run(args).await,
        Commands::BackfillVectors(args) => backfill::run(args).await,
        Commands::EnableQuantization(args) => maintenance::enable_quantization(args).await,
        Commands::OptimizeHnsw(args) => maintenance::optimize_hnsw(args).await,
        Commands::Backup(args) => backup::run(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
