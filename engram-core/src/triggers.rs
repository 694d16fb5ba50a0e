//! Pure trigger detectors used by the hook runtime.
//!
//! No I/O beyond the `is_new_file` stat; every detector returns either a
//! usable signature/topic or `None`. The session-edited-files map is
//! process-local by design: a fresh hook process re-detecting a first
//! edit is correct behavior.

use crate::extraction::LANGUAGE_MAP;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::OnceLock;

const SIGNATURE_MAX_CHARS: usize = 200;
/// Cap on concurrently tracked sessions; enforcement never exceeds it.
const MAX_TRACKED_SESSIONS: usize = 64;

#[allow(clippy::unwrap_used)]
fn error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Structured forms stay case-sensitive so conversational "error"
        // does not fire the trigger. The Error/Exception patterns also
        // match compound exception names (TypeError, ModuleNotFoundError):
        // `\b` alone never matches inside a PascalCase identifier.
        [
            r"\b[A-Za-z]*Error\b",
            r"\b[A-Za-z]*Exception\b",
            r"\bTraceback\b",
            r"\bFAILED:",
            r"\bfatal\b",
            r"\bpanicked at\b",
            r"\bpanic\b",
            r"\bbug\b",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

#[allow(clippy::unwrap_used)]
fn decision_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)why\s+(?:did|do)\s+we\s*",
            r"(?i)what\s+(?:was|did)\s+we\s+decide[d]?\s*(?:about|on)?\s*",
            r"(?i)what\s+was\s+decided\s*(?:about|on)?\s*",
            r"(?i)remember\s+when\s*",
            r"(?i)remember\s+the\s+decision\s*(?:about|on)?\s*",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Extract a searchable error signature from command output.
///
/// A python-style traceback yields its final exception line; otherwise the
/// first line matching the pattern set, truncated to 200 chars.
#[must_use]
pub fn detect_error_signal(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    if text.contains("Traceback (most recent call last)") {
        if let Some(line) = text
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
        {
            return Some(truncate_chars(line, SIGNATURE_MAX_CHARS));
        }
    }

    for line in text.lines() {
        if error_patterns().iter().any(|p| p.is_match(line)) {
            return Some(truncate_chars(line.trim(), SIGNATURE_MAX_CHARS));
        }
    }
    None
}

/// Detect decision-recall phrasing in a prompt; returns the residual
/// topic with the trailing `?` stripped.
#[must_use]
pub fn detect_decision_keywords(prompt: &str) -> Option<String> {
    for pattern in decision_patterns() {
        if let Some(m) = pattern.find(prompt) {
            let topic = prompt[m.end()..].trim().trim_end_matches('?').trim();
            if topic.is_empty() {
                return Some(prompt.trim().trim_end_matches('?').to_string());
            }
            return Some(topic.to_string());
        }
    }
    None
}

/// True only when the path does not exist on disk.
#[must_use]
pub fn is_new_file(path: &str) -> bool {
    !Path::new(path).exists()
}

type SessionEditMap = LruCache<String, HashSet<String>>;

#[allow(clippy::unwrap_used)]
fn session_edits() -> &'static Mutex<SessionEditMap> {
    static EDITS: OnceLock<Mutex<SessionEditMap>> = OnceLock::new();
    EDITS.get_or_init(|| {
        Mutex::new(LruCache::new(NonZeroUsize::new(MAX_TRACKED_SESSIONS).unwrap()))
    })
}

/// First call for a `(session, path)` pair returns true and records it;
/// later calls return false. Sessions are strictly isolated; total
/// tracked sessions are LRU-capped.
#[must_use]
pub fn is_first_edit_in_session(path: &str, session_id: &str) -> bool {
    let absolute = std::path::absolute(path)
        .map_or_else(|_| path.to_string(), |p| p.to_string_lossy().into_owned());
    let mut map = session_edits().lock();
    let edited = map.get_or_insert_mut(session_id.to_string(), HashSet::new);
    edited.insert(absolute)
}

/// Test-only reset of the session-edited-files map.
pub fn reset_session_edits() {
    session_edits().lock().clear();
}

/// Pull file-looking tokens out of a shell command: not a flag, quotes
/// stripped, contains `.` or `/`, and a known language suffix.
#[must_use]
pub fn extract_file_paths(command: &str) -> Vec<String> {
    command
        .split_whitespace()
        .filter(|token| !token.starts_with('-'))
        .map(|token| token.trim_matches(|c| c == '"' || c == '\'' || c == '`'))
        .filter(|token| token.contains('.') || token.contains('/'))
        .filter(|token| {
            Path::new(token)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    let lower = ext.to_lowercase();
                    LANGUAGE_MAP.iter().any(|(known, _)| *known == lower)
                })
        })
        .map(ToString::to_string)
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_lines_are_detected() {
        let output = "collecting tests\nError: invalid path /foo/bar\ndone";
        assert_eq!(
            detect_error_signal(output).unwrap(),
            "Error: invalid path /foo/bar"
        );
    }

    #[test]
    fn conversational_error_does_not_fire() {
        assert!(detect_error_signal("no error here, all good").is_none());
        assert!(detect_error_signal("we should handle the error case").is_none());
    }

    #[test]
    fn bare_compound_exception_names_are_detected() {
        // No traceback preamble: these must match the plain line scan.
        assert_eq!(
            detect_error_signal("ModuleNotFoundError: No module named 'requests'").unwrap(),
            "ModuleNotFoundError: No module named 'requests'"
        );
        assert_eq!(
            detect_error_signal("TypeError: unsupported operand type(s)").unwrap(),
            "TypeError: unsupported operand type(s)"
        );
        assert_eq!(
            detect_error_signal("ValueError: invalid literal for int()").unwrap(),
            "ValueError: invalid literal for int()"
        );
        assert_eq!(
            detect_error_signal("KeyError: 'missing'").unwrap(),
            "KeyError: 'missing'"
        );
        assert!(detect_error_signal("java.lang.NullPointerException at Foo.bar").is_some());
    }

    #[test]
    fn traceback_yields_final_exception_line() {
        let output = "Traceback (most recent call last):\n  File \"app.py\", line 3\n    import requests\nModuleNotFoundError: No module named 'requests'\n";
        assert_eq!(
            detect_error_signal(output).unwrap(),
            "ModuleNotFoundError: No module named 'requests'"
        );
    }

    #[test]
    fn signature_is_capped_at_200_chars() {
        let output = format!("Error: {}", "x".repeat(500));
        assert_eq!(detect_error_signal(&output).unwrap().chars().count(), 200);
    }

    #[test]
    fn decision_keywords_yield_topic() {
        assert_eq!(
            detect_decision_keywords("Why did we choose port 26350?").unwrap(),
            "choose port 26350"
        );
        assert_eq!(
            detect_decision_keywords("what did we decide about caching?").unwrap(),
            "caching"
        );
        assert!(detect_decision_keywords("add a cache layer").is_none());
    }

    #[test]
    fn first_edit_tracking_is_session_scoped() {
        reset_session_edits();
        assert!(is_first_edit_in_session("/tmp/a.rs", "session-1"));
        assert!(!is_first_edit_in_session("/tmp/a.rs", "session-1"));
        assert!(is_first_edit_in_session("/tmp/b.rs", "session-1"));
        // A different session re-detects the same path.
        assert!(is_first_edit_in_session("/tmp/a.rs", "session-2"));
    }

    #[test]
    fn session_cap_is_never_exceeded() {
        reset_session_edits();
        for i in 0..(MAX_TRACKED_SESSIONS + 10) {
            let _ = is_first_edit_in_session("/tmp/x.rs", &format!("session-{i}"));
        }
        assert!(session_edits().lock().len() <= MAX_TRACKED_SESSIONS);
    }

    #[test]
    fn file_paths_from_command_tokens() {
        let paths = extract_file_paths("python tests/test_app.py --verbose -o out.log");
        assert_eq!(paths, vec!["tests/test_app.py"]);

        let paths = extract_file_paths("cargo build && vim src/main.rs");
        assert_eq!(paths, vec!["src/main.rs"]);

        assert!(extract_file_paths("ls -la").is_empty());
    }

    #[test]
    fn new_file_detection() {
        assert!(is_new_file("/definitely/not/a/real/path.rs"));
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!is_new_file(file.path().to_str().unwrap()));
    }
}
