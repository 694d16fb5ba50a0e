//! User-visible activity log.
//!
//! Append-only `[<ISO timestamp>] <message>` lines at
//! `$INSTALL_DIR/logs/activity.log`, rotated probabilistically so the
//! check costs nothing on the hook hot path. Failures are swallowed: the
//! activity log is feedback, never a dependency.

use crate::config::Config;
use rand::Rng;
use std::io::Write;
use std::path::Path;

const MAX_LINES: usize = 500;
const KEEP_LINES: usize = 450;
const ROTATE_CHECK_PROBABILITY: f64 = 0.02;

/// Append one line to the activity log. Newlines in the message are
/// escaped so downstream line-oriented parsers stay happy.
pub fn log_activity(config: &Config, message: &str) {
    let path = config.activity_log_file();
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }

    rotate_if_needed(&path);

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S");
    let safe_message = message.replace('\n', "\\n");
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "[{timestamp}] {safe_message}");
    }
}

/// Check ~2% of the time; keep the tail when over the cap.
fn rotate_if_needed(path: &Path) {
    if rand::rng().random::<f64>() > ROTATE_CHECK_PROBABILITY {
        return;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= MAX_LINES {
        return;
    }
    let tail = lines[lines.len() - KEEP_LINES..].join("\n");
    let _ = std::fs::write(path, format!("{tail}\n"));
}
