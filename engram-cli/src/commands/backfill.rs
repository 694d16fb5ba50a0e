//! `engram backfill-vectors`: promote pending zero-vector records.

use super::Clients;
use clap::Args;
use engram_core::storage::backfill::backfill_pending;
use engram_core::Collection;
use std::process::ExitCode;

#[derive(Args)]
pub struct BackfillArgs {
    /// Backfill a single collection instead of all three
    #[arg(long)]
    pub collection: Option<Collection>,

    /// Count pending records without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Points per scroll batch
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,
}

pub async fn run(args: BackfillArgs) -> anyhow::Result<ExitCode> {
    let clients = Clients::connect().await?;
    let collections = match args.collection {
        Some(collection) => vec![collection],
        None => Collection::ALL.to_vec(),
    };

    let mut promoted = 0usize;
    let mut failed = 0usize;
    let mut pending = 0usize;

    for collection in collections {
        let stats = backfill_pending(
            clients.store.as_ref(),
            clients.embedder.as_ref(),
            collection,
            args.batch_size,
            args.dry_run,
        )
        .await?;
        println!(
            "{collection}: {} pending, {} promoted, {} failed",
            stats.pending_seen, stats.promoted, stats.failed
        );
        promoted += stats.promoted;
        failed += stats.failed;
        pending += stats.pending_seen;
    }

    if args.dry_run {
        println!("Dry run: {pending} records would be backfilled");
    } else {
        println!("Backfill complete: {promoted} promoted, {failed} failed");
    }
    Ok(ExitCode::SUCCESS)
}
