//! `engram backup`: timestamped snapshot tree.
//!
//! Layout: `<output>/engram-backup-<stamp>/manifest.json` plus one JSONL
//! snapshot per collection (payload + vector per line). `--include-logs`
//! copies the activity and injection audit logs alongside.

use super::Clients;
use clap::Args;
use engram_core::vector::PointFilter;
use engram_core::{Collection, VectorStore};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

const SNAPSHOT_PAGE: usize = 256;

#[derive(Args)]
pub struct BackupArgs {
    /// Directory to create the backup tree in
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Also copy activity and audit logs
    #[arg(long)]
    pub include_logs: bool,
}

pub async fn run(args: BackupArgs) -> anyhow::Result<ExitCode> {
    let clients = Clients::connect().await?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let root = args.output.join(format!("engram-backup-{stamp}"));
    std::fs::create_dir_all(&root)?;

    let mut manifest_collections = Vec::new();

    for collection in Collection::ALL {
        let file_name = format!("{collection}.jsonl");
        let mut file = std::fs::File::create(root.join(&file_name))?;
        let mut written = 0usize;

        // Page through with vectors so a restore can re-upsert verbatim.
        let mut seen = std::collections::HashSet::new();
        loop {
            let points = clients
                .store
                .scroll(
                    collection,
                    &PointFilter::default(),
                    written + SNAPSHOT_PAGE,
                    true,
                )
                .await?;
            let fresh: Vec<_> = points
                .into_iter()
                .filter(|p| seen.insert(p.id))
                .collect();
            if fresh.is_empty() {
                break;
            }
            for point in fresh {
                let line = json!({
                    "id": point.id,
                    "payload": point.payload,
                    "vector": point.vector,
                });
                writeln!(file, "{line}")?;
                written += 1;
            }
        }

        println!("{collection}: {written} points → {file_name}");
        manifest_collections.push(json!({
            "collection": collection.name(),
            "file": file_name,
            "points": written,
        }));
    }

    let mut log_files = Vec::new();
    if args.include_logs {
        for source in [
            clients.config.activity_log_file(),
            clients.config.injection_audit_file(),
        ] {
            if source.exists() {
                if let Some(name) = source.file_name().and_then(|n| n.to_str()) {
                    std::fs::copy(&source, root.join(name))?;
                    log_files.push(name.to_string());
                }
            }
        }
    }

    let manifest = json!({
        "created_at": chrono::Utc::now().to_rfc3339(),
        "collections": manifest_collections,
        "logs": log_files,
        "version": env!("CARGO_PKG_VERSION"),
    });
    std::fs::write(
        root.join("manifest.json"),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    println!("Backup written to {}", root.display());
    Ok(ExitCode::SUCCESS)
}
