//! Hook wire protocol and process plumbing.
//!
//! Every hook reads one JSON envelope from stdin; read-side hooks answer
//! on stdout with either a plain context block or the host's
//! `hookSpecificOutput` envelope. Write-side hooks fork a detached worker
//! and return immediately. Nothing here may fail the assistant: parse
//! errors yield `None` and callers exit 0.

use crate::observability::trace::TRACE_ID_ENV;
use serde::Deserialize;
use serde_json::Value;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use tracing::warn;

/// One hook invocation's input, a subset per event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl HookInput {
    /// Parse an envelope; malformed JSON is a `None`, not an error.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<HookInput>(raw) {
            Ok(input) => Some(input),
            Err(e) => {
                warn!(error = %e, "malformed hook input, doing nothing");
                None
            }
        }
    }

    /// Read one envelope from a stream (normally stdin).
    #[must_use]
    pub fn read_from(reader: &mut impl Read) -> Option<Self> {
        let mut raw = String::new();
        if reader.read_to_string(&mut raw).is_err() {
            warn!("failed to read hook input stream");
            return None;
        }
        Self::parse(&raw)
    }

    /// Transcript path with `~` expanded.
    #[must_use]
    pub fn expanded_transcript_path(&self) -> Option<String> {
        self.transcript_path.as_ref().map(|p| expand_tilde(p))
    }

    /// Working directory, defaulting to the process cwd.
    #[must_use]
    pub fn cwd_or_default(&self) -> String {
        self.cwd.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "/".to_string())
        })
    }

    /// String field from `tool_input`.
    #[must_use]
    pub fn tool_input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.as_ref()?.get(key)?.as_str()
    }

    /// String field from `tool_response`.
    #[must_use]
    pub fn tool_response_str(&self, key: &str) -> Option<&str> {
        self.tool_response.as_ref()?.get(key)?.as_str()
    }

    /// Command exit code from `tool_response`, when the host reported one.
    #[must_use]
    pub fn tool_exit_code(&self) -> Option<i64> {
        self.tool_response.as_ref()?.get("exitCode")?.as_i64()
    }
}

/// `~` expansion for host-supplied paths.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

/// Print the host's JSON envelope for a read-side hook.
pub fn emit_hook_output(event_name: &str, additional_context: &str) {
    let envelope = serde_json::json!({
        "hookSpecificOutput": {
            "hookEventName": event_name,
            "additionalContext": additional_context,
        }
    });
    println!("{envelope}");
}

/// Spawn a detached worker process (own session, inherited trace id),
/// pipe `payload` to its stdin and return without waiting.
///
/// A broken pipe on the stdin write is logged and tolerated: the worker
/// may have exited early, and the hook must still return 0.
pub fn spawn_detached_worker(subcommand: &str, payload: &str, trace_id: &str) -> bool {
    let Ok(exe) = std::env::current_exe() else {
        warn!("cannot resolve current executable for worker spawn");
        return false;
    };

    let mut command = Command::new(exe);
    command
        .arg(subcommand)
        .env(TRACE_ID_ENV, trace_id)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New session: the worker must outlive the hook and the host's
        // process-group signals.
        command.process_group(0);
    }

    match command.spawn() {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(payload.as_bytes()) {
                    warn!(error = %e, "broken pipe writing worker payload");
                }
            }
            // Dropping the handle leaves the worker running detached.
            true
        }
        Err(e) => {
            warn!(error = %e, subcommand, "failed to spawn detached worker");
            false
        }
    }
}

/// Read a JSONL transcript, skipping malformed lines. Empty on any error.
#[must_use]
pub fn read_transcript(path: &str) -> Vec<Value> {
    let expanded = expand_tilde(path);
    let Ok(content) = std::fs::read_to_string(&expanded) else {
        warn!(path = expanded, "transcript not found");
        return Vec::new();
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Last assistant message text from a transcript, if present.
#[must_use]
pub fn last_assistant_message(entries: &[Value]) -> Option<String> {
    entries.iter().rev().find_map(|entry| {
        if entry.get("type")?.as_str()? != "assistant" {
            return None;
        }
        let content = entry.get("message")?.get("content")?;
        match content {
            Value::String(text) => Some(text.clone()),
            Value::Array(blocks) => {
                let text: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| {
                        (block.get("type")?.as_str()? == "text")
                            .then(|| block.get("text")?.as_str())?
                    })
                    .collect();
                if text.is_empty() {
                    None
                } else {
                    Some(text.join("\n"))
                }
            }
            _ => None,
        }
    })
}
