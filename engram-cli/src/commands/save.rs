//! `engram save-memory`: manual capture.

use super::Clients;
use clap::Args;
use engram_core::project::detect_project;
use engram_core::{MemoryStorage, MemoryType, StoreRequest, StoreStatus};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Args)]
pub struct SaveArgs {
    /// Content to remember
    pub content: Vec<String>,

    /// Memory type for the record
    #[arg(long = "type", default_value = "agent_memory")]
    pub memory_type: ManualType,
}

/// Manual saves are restricted to the agent-authored types.
#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ManualType {
    AgentMemory,
    AgentInsight,
}

impl From<ManualType> for MemoryType {
    fn from(value: ManualType) -> Self {
        match value {
            ManualType::AgentMemory => MemoryType::AgentMemory,
            ManualType::AgentInsight => MemoryType::AgentInsight,
        }
    }
}

pub async fn run(args: SaveArgs) -> anyhow::Result<ExitCode> {
    let content = args.content.join(" ");
    if content.trim().is_empty() {
        anyhow::bail!("nothing to save");
    }

    let clients = Clients::connect().await?;
    let cwd = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".to_string());
    let project = detect_project(&cwd);

    let storage = MemoryStorage::new(
        clients.store.clone(),
        clients.embedder.clone(),
        Arc::clone(&clients.config),
    );
    let request = StoreRequest::new(
        content,
        cwd,
        args.memory_type.into(),
        "manual_save",
        format!("manual-{}", uuid::Uuid::new_v4()),
    )
    .with_group_id(project);

    let outcome = storage.store_memory(request).await?;
    match outcome.status {
        StoreStatus::Stored => println!(
            "Stored ({})",
            outcome
                .memory_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        ),
        StoreStatus::Duplicate => println!("Already stored (duplicate)"),
        StoreStatus::Blocked => println!("Blocked: content contains a secret"),
        StoreStatus::Queued => println!("Store unavailable; queued for retry"),
    }
    Ok(ExitCode::SUCCESS)
}
