//! Write-side hooks.
//!
//! Each handler reads the envelope, applies its gate, builds a
//! [`StoreRequest`] payload and forks the detached `store-worker`. The
//! hook process itself does no network I/O and returns in milliseconds.

use anyhow::Result;
use engram_core::hooks::{
    last_assistant_message, read_transcript, spawn_detached_worker, HookInput,
};
use engram_core::injection::InjectionSessionState;
use engram_core::observability::trace;
use engram_core::triggers::{detect_error_signal, extract_file_paths};
use engram_core::{extraction, MemoryType, StoreRequest};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Tools whose output feeds the code-patterns collection.
const PATTERN_TOOLS: &[&str] = &["Edit", "Write", "NotebookEdit"];

fn read_input() -> Option<HookInput> {
    HookInput::read_from(&mut std::io::stdin().lock())
}

fn dispatch(request: &StoreRequest) -> Result<()> {
    let payload = serde_json::to_string(request)?;
    let trace_id = trace::current_trace_id();
    spawn_detached_worker("store-worker", &payload, &trace_id);
    Ok(())
}

/// `UserPromptSubmit` capture: store the user message as a
/// `user_message` record.
pub fn user_prompt_capture() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    let Some(prompt) = input.prompt.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(());
    };

    let state = InjectionSessionState::load(&input.session_id);
    let request = StoreRequest::new(
        prompt,
        input.cwd_or_default(),
        MemoryType::UserMessage,
        "user_prompt_capture",
        &input.session_id,
    )
    .with_extra("turn_number", json!(state.turn_count + 1));

    dispatch(&request)
}

/// `PostToolUse` capture for Edit/Write/NotebookEdit: extract a pattern
/// and store it to code-patterns.
pub fn post_tool_capture() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    let Some(tool_name) = input.tool_name.as_deref() else {
        return Ok(());
    };
    if !PATTERN_TOOLS.contains(&tool_name) {
        return Ok(());
    }

    let content = match tool_name {
        "Edit" => input.tool_input_str("new_string"),
        "Write" => input.tool_input_str("content"),
        "NotebookEdit" => input.tool_input_str("new_source"),
        _ => None,
    };
    let Some(content) = content else {
        return Ok(());
    };
    let file_path = input.tool_input_str("file_path").unwrap_or_default();

    let Some(pattern) = extraction::extract_patterns(content, file_path) else {
        return Ok(());
    };

    let request = StoreRequest::new(
        pattern.content,
        input.cwd_or_default(),
        MemoryType::Implementation,
        "post_tool_capture",
        &input.session_id,
    )
    .with_extra("file_path", Value::from(pattern.file_path))
    .with_extra("language", Value::from(pattern.language))
    .with_extra("framework", Value::from(pattern.framework))
    .with_extra("importance", Value::from(pattern.importance))
    .with_extra("tags", json!(pattern.tags));

    dispatch(&request)
}

/// `Stop` capture: read the assistant's last message from the transcript
/// (short bounded retry, since the host may not have flushed it yet) and store
/// it as an `agent_response` record.
pub fn agent_response_capture() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    let Some(path) = input.expanded_transcript_path() else {
        return Ok(());
    };

    let mut message = None;
    for attempt in 0..3 {
        let entries = read_transcript(&path);
        message = last_assistant_message(&entries);
        if message.is_some() {
            break;
        }
        if attempt < 2 {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
    let Some(message) = message else {
        warn!(path, "no assistant message found in transcript");
        return Ok(());
    };

    let request = StoreRequest::new(
        message,
        input.cwd_or_default(),
        MemoryType::AgentResponse,
        "agent_response_capture",
        &input.session_id,
    );
    dispatch(&request)
}

/// `PostToolUse` Bash failure capture: store the error context as an
/// `error_pattern` record with the command and message preserved.
pub fn error_pattern_capture() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };
    if input.tool_name.as_deref() != Some("Bash") {
        return Ok(());
    }
    // An explicit zero exit code means success, whatever the output says.
    if input.tool_exit_code().is_some_and(|code| code == 0) {
        return Ok(());
    }
    let stderr = input.tool_response_str("stderr").unwrap_or_default();
    let stdout = input.tool_response_str("stdout").unwrap_or_default();
    let Some(error_message) = detect_error_signal(stderr).or_else(|| detect_error_signal(stdout))
    else {
        return Ok(());
    };

    let command = input.tool_input_str("command").unwrap_or_default().to_string();
    let file_references = extract_file_paths(&command);
    let output = if stderr.is_empty() { stdout } else { stderr };

    let content = format!("Command: {command}\nError: {error_message}\nOutput:\n{output}");
    let request = StoreRequest::new(
        content,
        input.cwd_or_default(),
        MemoryType::ErrorPattern,
        "error_pattern_capture",
        &input.session_id,
    )
    .with_extra("command", Value::from(command))
    .with_extra("error_message", Value::from(error_message))
    .with_extra("output", Value::from(output.to_string()))
    .with_extra("file_references", json!(file_references));

    dispatch(&request)
}

/// `PreCompact` capture: persist a session summary, then clear the
/// session's injected-id set so post-compaction turns can re-inject.
pub fn pre_compact_save() -> Result<()> {
    let Some(input) = read_input() else {
        return Ok(());
    };

    if let Some(path) = input.expanded_transcript_path() {
        let entries = read_transcript(&path);
        let summary = summarize_session(&entries);
        if !summary.is_empty() {
            let request = StoreRequest::new(
                summary,
                input.cwd_or_default(),
                MemoryType::SessionSummary,
                "pre_compact_save",
                &input.session_id,
            );
            dispatch(&request)?;
        }
    }

    // Reset after the summary is on its way: injected ids clear, drift
    // accounting survives.
    let mut state = InjectionSessionState::load(&input.session_id);
    state.reset_after_compact();
    state.save()?;
    info!(session_id = input.session_id, "injection state reset for compaction");
    Ok(())
}

/// Cheap extractive summary: the session's user prompts plus the final
/// assistant message. The classifier refines the record later.
fn summarize_session(entries: &[Value]) -> String {
    let mut prompts: Vec<&str> = Vec::new();
    for entry in entries {
        if entry.get("type").and_then(Value::as_str) == Some("user") {
            if let Some(text) = entry
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                prompts.push(text);
            }
        }
    }
    let mut sections = Vec::new();
    if !prompts.is_empty() {
        let recent: Vec<&str> = prompts.iter().rev().take(10).rev().copied().collect();
        sections.push(format!("Session topics:\n- {}", recent.join("\n- ")));
    }
    if let Some(last) = last_assistant_message(entries) {
        sections.push(format!("Last assistant update:\n{last}"));
    }
    sections.join("\n\n")
}
