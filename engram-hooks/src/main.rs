//! Hook runtime: one short-lived subcommand per assistant event.
//!
//! Read-side hooks retrieve and answer on stdout inside a 500 ms budget;
//! write-side hooks fork a detached `store-worker` and return in
//! milliseconds. Every command exits 0 on every outcome except an
//! unrecoverable failure inside the background capture path.

use clap::{Parser, Subcommand};
use engram_core::observability::{init_logging, metrics};
use std::process::ExitCode;
use std::time::Instant;
use tracing::error;

mod capture;
mod read_side;
mod worker;

#[derive(Parser)]
#[command(name = "engram-hooks")]
#[command(about = "Event hooks for the Engram memory layer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: HookCommand,
}

#[derive(Subcommand)]
enum HookCommand {
    /// Tier-1 bootstrap at session start
    SessionStart,
    /// Capture the user's message (write side)
    UserPromptCapture,
    /// Tier-2 per-turn context injection
    ContextInjectionTier2,
    /// Capture patterns from Edit/Write/NotebookEdit (write side)
    PostToolCapture,
    /// Capture the assistant's final message on Stop (write side)
    AgentResponseCapture,
    /// Capture error patterns from failed Bash runs (write side)
    ErrorPatternCapture,
    /// Retrieve prior fixes when a command output looks like an error
    ErrorDetection,
    /// Retrieve file patterns on the first edit of a file this session
    FirstEditTrigger,
    /// Retrieve naming/structure conventions when writing a new file
    NewFileTrigger,
    /// Retrieve conventions after reading a file
    ReadContextTrigger,
    /// Persist a session summary before compaction (write side)
    PreCompactSave,
    /// Detached storage worker (internal)
    #[command(hide = true)]
    StoreWorker,
    /// Detached metrics pusher (internal)
    #[command(hide = true)]
    MetricsPush,
}

impl HookCommand {
    fn name(&self) -> &'static str {
        match self {
            HookCommand::SessionStart => "session_start",
            HookCommand::UserPromptCapture => "user_prompt_capture",
            HookCommand::ContextInjectionTier2 => "context_injection_tier2",
            HookCommand::PostToolCapture => "post_tool_capture",
            HookCommand::AgentResponseCapture => "agent_response_capture",
            HookCommand::ErrorPatternCapture => "error_pattern_capture",
            HookCommand::ErrorDetection => "error_detection",
            HookCommand::FirstEditTrigger => "first_edit_trigger",
            HookCommand::NewFileTrigger => "new_file_trigger",
            HookCommand::ReadContextTrigger => "read_context_trigger",
            HookCommand::PreCompactSave => "pre_compact_save",
            HookCommand::StoreWorker => "store_worker",
            HookCommand::MetricsPush => "metrics_push",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging("info");
    let cli = Cli::parse();
    let hook_name = cli.command.name();
    let started = Instant::now();

    let result = match cli.command {
        HookCommand::SessionStart => read_side::session_start().await,
        HookCommand::UserPromptCapture => capture::user_prompt_capture(),
        HookCommand::ContextInjectionTier2 => read_side::context_injection_tier2().await,
        HookCommand::PostToolCapture => capture::post_tool_capture(),
        HookCommand::AgentResponseCapture => capture::agent_response_capture(),
        HookCommand::ErrorPatternCapture => capture::error_pattern_capture(),
        HookCommand::ErrorDetection => read_side::error_detection().await,
        HookCommand::FirstEditTrigger => read_side::first_edit_trigger().await,
        HookCommand::NewFileTrigger => read_side::new_file_trigger().await,
        HookCommand::ReadContextTrigger => read_side::read_context_trigger().await,
        HookCommand::PreCompactSave => capture::pre_compact_save(),
        HookCommand::StoreWorker => return worker::store_worker().await,
        HookCommand::MetricsPush => return worker::metrics_push().await,
    };

    metrics::observe_hook_duration(hook_name, started.elapsed().as_secs_f64());
    worker::push_metrics_detached();

    if let Err(e) = result {
        // A hook never propagates failure to the assistant.
        error!(hook = hook_name, error = %e, "hook failed, exiting clean");
        metrics::record_failure(hook_name, "unhandled");
    }
    ExitCode::SUCCESS
}
