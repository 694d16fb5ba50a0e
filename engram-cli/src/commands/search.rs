//! `engram search`: semantic lookup with optional routing.

use super::Clients;
use clap::Args;
use engram_core::project::detect_project;
use engram_core::{route_collections, Collection, MemoryType, SearchQuery};
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Args)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Search one collection instead of routing by intent
    #[arg(long)]
    pub collection: Option<Collection>,

    /// Restrict to a memory type (e.g. decision, error_fix)
    #[arg(long = "type")]
    pub memory_type: Option<String>,

    /// Force intent routing even when --collection is given
    #[arg(long)]
    pub intent: bool,

    /// Maximum results per collection
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

pub async fn run(args: SearchArgs) -> anyhow::Result<ExitCode> {
    let memory_type = args
        .memory_type
        .as_deref()
        .map(MemoryType::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let clients = Clients::connect().await?;
    let search = clients.search_client();
    let project = detect_project(
        &std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );

    let routes: Vec<(Collection, bool)> = match (args.collection, args.intent) {
        (Some(collection), false) => vec![(collection, collection.is_shared())],
        _ => route_collections(&args.query)
            .into_iter()
            .map(|r| (r.collection, r.shared))
            .collect(),
    };

    let mut total = 0;
    for (collection, shared) in routes {
        let mut query = SearchQuery::new(&args.query, collection).with_limit(args.limit);
        if !shared {
            query = query.for_group(&project);
        }
        if let Some(memory_type) = memory_type {
            query = query.with_types(vec![memory_type]);
        }
        let hits = search.search(query).await?;
        if hits.is_empty() {
            continue;
        }
        println!("== {collection} ==");
        for hit in hits {
            total += 1;
            println!(
                "[{:.2}] {} ({}) {}",
                hit.score,
                hit.memory_type,
                hit.group_id,
                hit.id
            );
            println!("    {}", preview(&hit.content));
        }
    }

    if total == 0 {
        println!("No results.");
    }
    Ok(ExitCode::SUCCESS)
}

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let mut end = flat.len().min(160);
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    if end < flat.len() {
        format!("{}…", &flat[..end])
    } else {
        flat
    }
}
