//! Pattern extraction from code edits.
//!
//! Turns a file write/edit into an enriched code-patterns record:
//! language from the extension, framework from import shapes, an
//! importance grade, and retrieval tags. Returns `None` for content not
//! worth storing (empty, near-empty, binary).

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Extension → language, shared with the trigger engine's path extractor.
pub const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("jsx", "javascript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("rb", "ruby"),
    ("php", "php"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("h", "c"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
    ("md", "markdown"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("json", "json"),
    ("html", "html"),
    ("css", "css"),
    ("sql", "sql"),
    ("sh", "bash"),
    ("toml", "toml"),
];

const HIGH_IMPORTANCE_INDICATORS: &[&str] = &[
    "fn main",
    "impl ",
    "class ",
    "async fn",
    "async def",
    "def __init__",
    "CREATE TABLE",
    "migration",
    "auth",
    "security",
];

const HIGH_IMPORTANCE_PATHS: &[&str] = &["auth", "security", "config", "model"];
const LOW_IMPORTANCE_PATHS: &[&str] = &["test", "example", "tmp"];

/// Extracted pattern ready for the storage core.
#[derive(Debug, Clone)]
pub struct ExtractedPattern {
    /// Content with a `[language/framework] path` retrieval header.
    pub content: String,
    pub language: String,
    pub framework: String,
    pub importance: String,
    pub tags: Vec<String>,
    pub file_path: String,
}

/// Extract a storable pattern from edited file content.
#[must_use]
pub fn extract_patterns(content: &str, file_path: &str) -> Option<ExtractedPattern> {
    if content.is_empty() || content.len() < 10 {
        debug!(file_path, len = content.len(), "content too short to store");
        return None;
    }
    if content.contains('\0') {
        debug!(file_path, "binary content skipped");
        return None;
    }

    let language = detect_language(file_path);
    let framework = detect_framework(content, &language);
    let importance = assess_importance(content, file_path);
    let tags = extract_tags(content, &language, &framework);

    Some(ExtractedPattern {
        content: build_enriched_content(content, file_path, &language, &framework),
        language,
        framework,
        importance,
        tags,
        file_path: file_path.to_string(),
    })
}

/// Language from the file extension; `"unknown"` when unmapped.
#[must_use]
pub fn detect_language(file_path: &str) -> String {
    let suffix = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    LANGUAGE_MAP
        .iter()
        .find(|(ext, _)| *ext == suffix)
        .map_or_else(|| "unknown".to_string(), |(_, lang)| (*lang).to_string())
}

fn framework_regexes() -> &'static [(&'static str, &'static str, Regex)] {
    static REGEXES: OnceLock<Vec<(&'static str, &'static str, Regex)>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        let compile = |lang, name, pattern: &str| (lang, name, Regex::new(pattern).unwrap());
        vec![
            compile("python", "fastapi", r"(?:from\s+)?fastapi|import.*FastAPI"),
            compile("python", "flask", r"(?:from\s+)?flask|import.*Flask"),
            compile("python", "django", r"from django"),
            compile("python", "pytest", r"import pytest|from pytest"),
            compile("javascript", "react", r#"from ['"]react['"]"#),
            compile("javascript", "nextjs", r#"from ['"]next['"]"#),
            compile("javascript", "vue", r#"from ['"]vue['"]"#),
            compile("javascript", "express", r"express\("),
            compile("rust", "tokio", r"#\[tokio::(?:main|test)\]|use tokio"),
            compile("rust", "axum", r"use axum"),
        ]
    })
}

/// Framework from content import shapes; `"general"` when nothing matches.
#[must_use]
pub fn detect_framework(content: &str, language: &str) -> String {
    // typescript shares the javascript framework set.
    let lookup = if language == "typescript" {
        "javascript"
    } else {
        language
    };
    framework_regexes()
        .iter()
        .find(|(lang, _, regex)| *lang == lookup && regex.is_match(content))
        .map_or_else(|| "general".to_string(), |(_, name, _)| (*name).to_string())
}

/// `"high"` / `"normal"` / `"low"` importance grade.
#[must_use]
pub fn assess_importance(content: &str, file_path: &str) -> String {
    let path_lower = file_path.to_lowercase();

    if HIGH_IMPORTANCE_INDICATORS
        .iter()
        .any(|indicator| content.contains(indicator))
        || HIGH_IMPORTANCE_PATHS.iter().any(|p| path_lower.contains(p))
    {
        return "high".to_string();
    }

    if content.len() < 50
        || content.lines().count() < 3
        || LOW_IMPORTANCE_PATHS.iter().any(|p| path_lower.contains(p))
    {
        return "low".to_string();
    }

    "normal".to_string()
}

fn extract_tags(content: &str, language: &str, framework: &str) -> Vec<String> {
    let mut tags = vec![language.to_string()];
    if framework != "general" {
        tags.push(framework.to_string());
    }

    let lower = content.to_lowercase();
    if content.contains("async") || content.contains("await") {
        tags.push("async".to_string());
    }
    if lower.contains("test") || content.contains("describe(") {
        tags.push("testing".to_string());
    }
    if lower.contains("api") || lower.contains("endpoint") {
        tags.push("api".to_string());
    }
    if lower.contains("config") || lower.contains("settings") {
        tags.push("config".to_string());
    }
    if content.contains("try:") || content.contains("catch") || content.contains("Result<") {
        tags.push("error-handling".to_string());
    }
    tags
}

fn build_enriched_content(
    content: &str,
    file_path: &str,
    language: &str,
    framework: &str,
) -> String {
    if framework == "general" {
        format!("[{language}] {file_path}\n\n{content}")
    } else {
        format!("[{language}/{framework}] {file_path}\n\n{content}")
    }
}
