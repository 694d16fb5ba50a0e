//! Project (tenant) detection from a working directory.

use std::path::Path;

/// Resolve the `group_id` for a working directory.
///
/// Walks up from `cwd` looking for a `.git` marker and uses that
/// directory's name; falls back to the basename of `cwd` itself. Returns
/// `"unknown"` when nothing usable is found (root, empty path).
#[must_use]
pub fn detect_project(cwd: &str) -> String {
    let path = Path::new(cwd);

    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                return sanitize(name);
            }
        }
        current = dir.parent();
    }

    path.file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| "unknown".to_string(), sanitize)
}

/// Group ids are payload-index keys; keep them lowercase and free of
/// whitespace.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
