//! `engram enable-quantization` and `engram optimize-hnsw`.

use super::Clients;
use clap::Args;
use engram_core::{Collection, VectorStore};
use std::io::Write;
use std::process::ExitCode;

#[derive(Args)]
pub struct QuantizationArgs {
    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub async fn enable_quantization(args: QuantizationArgs) -> anyhow::Result<ExitCode> {
    if args.dry_run {
        for collection in Collection::ALL {
            println!("would enable int8 scalar quantization (quantile 0.99, always_ram) on {collection}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !args.yes && !confirm("Enable scalar quantization on all collections? [y/N] ")? {
        println!("Aborted");
        return Ok(ExitCode::SUCCESS);
    }

    let clients = Clients::connect().await?;
    for collection in Collection::ALL {
        clients.store.enable_quantization(collection).await?;
        println!("quantization enabled on {collection}");
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Args)]
pub struct HnswArgs {
    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Optimize a single collection instead of all three
    #[arg(long)]
    pub collection: Option<Collection>,
}

pub async fn optimize_hnsw(args: HnswArgs) -> anyhow::Result<ExitCode> {
    let collections = match args.collection {
        Some(collection) => vec![collection],
        None => Collection::ALL.to_vec(),
    };

    if args.dry_run {
        for collection in &collections {
            println!("would create tenant-aware group_id/source indexes on {collection}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let clients = Clients::connect().await?;
    for collection in collections {
        clients.store.create_payload_indexes(collection).await?;
        println!("tenant indexes ensured on {collection}");
    }
    Ok(ExitCode::SUCCESS)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
