//! Hook and CLI process contracts: exit codes, non-blocking failure, and
//! the compaction reset path, exercised through the real binaries.

use assert_cmd::Command;
use engram_core::injection::InjectionSessionState;
use engram_core::queue::QueueLock;
use predicates::prelude::*;

fn hooks_cmd() -> Command {
    Command::cargo_bin("engram-hooks").expect("engram-hooks binary built by the workspace")
}

fn cli_cmd() -> Command {
    Command::cargo_bin("engram").expect("engram binary built by the workspace")
}

#[test]
fn malformed_json_exits_zero_for_every_capture_hook() {
    for hook in [
        "user-prompt-capture",
        "post-tool-capture",
        "agent-response-capture",
        "error-pattern-capture",
        "pre-compact-save",
    ] {
        hooks_cmd()
            .arg(hook)
            .write_stdin("{definitely not json")
            .assert()
            .success();
    }
}

#[test]
fn unknown_tool_is_ignored_quietly() {
    hooks_cmd()
        .arg("post-tool-capture")
        .write_stdin(r#"{"session_id":"s1","tool_name":"Glob","tool_input":{"pattern":"*"}}"#)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn error_detection_ignores_non_bash_tools() {
    hooks_cmd()
        .arg("error-detection")
        .write_stdin(r#"{"session_id":"s1","tool_name":"Read","tool_response":{"stderr":"Error: nope"}}"#)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn error_detection_fires_on_a_bare_compound_exception() {
    // A failing pip-less python run: no traceback preamble, just the
    // exception line. The trigger must fire; with the store pointed at a
    // closed port the retrieval degrades to silence and the hook still
    // exits 0.
    hooks_cmd()
        .arg("error-detection")
        .env("ENGRAM_QDRANT_URL", "http://127.0.0.1:1")
        .write_stdin(
            r#"{"session_id":"s1","tool_name":"Bash","tool_input":{"command":"python app.py"},"tool_response":{"stdout":"","stderr":"ModuleNotFoundError: No module named 'requests'","exitCode":1}}"#,
        )
        .assert()
        .success();
}

#[test]
fn error_detection_ignores_clean_output() {
    hooks_cmd()
        .arg("error-detection")
        .write_stdin(
            r#"{"session_id":"s1","tool_name":"Bash","tool_input":{"command":"ls"},"tool_response":{"stdout":"ok","stderr":"","exitCode":0}}"#,
        )
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn pre_compact_save_resets_injected_ids() {
    let session = format!("compact-bin-{}", uuid::Uuid::new_v4());
    let mut state = InjectionSessionState::fresh(&session);
    state.injected_point_ids = (0..5).map(|i| format!("id-{i}")).collect();
    state.last_query_embedding = Some(vec![0.25, 0.5]);
    state.topic_drift = 0.7;
    state.save().unwrap();

    let dir = tempfile::tempdir().unwrap();
    hooks_cmd()
        .arg("pre-compact-save")
        .env("ENGRAM_INSTALL_DIR", dir.path())
        .write_stdin(format!(r#"{{"session_id":"{session}"}}"#))
        .assert()
        .success();

    let reloaded = InjectionSessionState::load(&session);
    assert!(reloaded.injected_point_ids.is_empty());
    assert_eq!(reloaded.last_query_embedding, Some(vec![0.25, 0.5]));
    assert!((reloaded.topic_drift - 0.7).abs() < f64::EPSILON);

    let _ = std::fs::remove_file(InjectionSessionState::path(&session));
}

#[test]
fn retry_stats_work_without_a_store() {
    let dir = tempfile::tempdir().unwrap();
    cli_cmd()
        .args(["retry-queue", "--stats"])
        .env("ENGRAM_INSTALL_DIR", dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Total items: 0"));
}

#[test]
fn concurrent_retry_processor_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = engram_core::Config::from_env();
    config.install_dir = dir.path().to_path_buf();
    config.lock_file = dir.path().join("backfill.lock");

    let _held = QueueLock::acquire(&config).unwrap();

    cli_cmd()
        .args(["retry-queue", "--dry-run"])
        .env("ENGRAM_INSTALL_DIR", dir.path())
        .env("ENGRAM_LOCK_FILE", dir.path().join("backfill.lock"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("locked"));
}

#[test]
fn invalid_arguments_exit_two() {
    cli_cmd().arg("--definitely-not-a-flag").assert().code(2);
    cli_cmd()
        .args(["backfill-vectors", "--collection", "nonsense"])
        .assert()
        .code(2);
}

/// Latency smoke: a gated hook invocation (no store, no network) stays
/// inside the write-side budget with generous CI headroom. Run with
/// `cargo test -- --ignored` on a quiet machine for the strict numbers.
#[test]
#[ignore = "timing-sensitive; run on a quiet machine"]
fn gated_hook_p95_is_under_the_budget() {
    let mut samples = Vec::new();
    for _ in 0..100 {
        let start = std::time::Instant::now();
        hooks_cmd()
            .arg("post-tool-capture")
            .write_stdin(r#"{"session_id":"s1","tool_name":"Glob"}"#)
            .assert()
            .success();
        samples.push(start.elapsed());
    }
    samples.sort();
    let p95 = samples[94];
    assert!(
        p95 < std::time::Duration::from_millis(500),
        "p95 hook latency {p95:?} exceeds the envelope"
    );
}
