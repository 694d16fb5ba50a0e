use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three vector-store namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    CodePatterns,
    Conventions,
    Discussions,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::CodePatterns,
        Collection::Conventions,
        Collection::Discussions,
    ];

    /// Collection name as it appears in the vector store.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Collection::CodePatterns => "code-patterns",
            Collection::Conventions => "conventions",
            Collection::Discussions => "discussions",
        }
    }

    /// Conventions are shared across projects; the other collections are
    /// tenant-scoped by `group_id`.
    #[must_use]
    pub fn is_shared(self) -> bool {
        matches!(self, Collection::Conventions)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-patterns" => Ok(Collection::CodePatterns),
            "conventions" => Ok(Collection::Conventions),
            "discussions" => Ok(Collection::Discussions),
            other => Err(format!("unknown collection: {other}")),
        }
    }
}

/// Which embedding model a record's content is embedded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Prose,
    Code,
}

/// Per-type content reduction rule applied before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// End-truncate at the nearest sentence boundary within the budget.
    SentenceEnd { max_tokens: usize },
    /// Preserve command and error message verbatim; head+tail the output.
    Structured { max_output_tokens: usize },
    /// No per-type rule; only the collection-wide ceiling applies.
    CollectionCeiling,
}

/// Closed enumeration of memory record types across the three collections.
///
/// Unknown tags fail deserialization and therefore fail validation before
/// they ever reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    // code-patterns
    Implementation,
    ErrorFix,
    ErrorPattern,
    Refactor,
    FilePattern,
    // conventions
    Guideline,
    Rule,
    Naming,
    Port,
    Structure,
    BestPractice,
    AntiPattern,
    // discussions
    Decision,
    Session,
    SessionSummary,
    Blocker,
    Preference,
    Context,
    ChatMemory,
    AgentDecision,
    UserMessage,
    AgentResponse,
    GithubPr,
    GithubIssue,
    GithubCommit,
    GithubCi,
    GithubRelease,
    GithubCodeBlob,
    JiraIssue,
    JiraComment,
    AgentHandoff,
    AgentMemory,
    AgentTask,
    AgentInsight,
}

impl MemoryType {
    /// Target collection for this tag.
    #[must_use]
    pub fn collection(self) -> Collection {
        use MemoryType::*;
        match self {
            Implementation | ErrorFix | ErrorPattern | Refactor | FilePattern => {
                Collection::CodePatterns
            }
            Guideline | Rule | Naming | Port | Structure | BestPractice | AntiPattern => {
                Collection::Conventions
            }
            Decision | Session | SessionSummary | Blocker | Preference | Context | ChatMemory
            | AgentDecision | UserMessage | AgentResponse | GithubPr | GithubIssue
            | GithubCommit | GithubCi | GithubRelease | GithubCodeBlob | JiraIssue
            | JiraComment | AgentHandoff | AgentMemory | AgentTask | AgentInsight => {
                Collection::Discussions
            }
        }
    }

    /// Embedding model routing: code model for code-patterns content and
    /// code blobs, prose model otherwise.
    #[must_use]
    pub fn model_kind(self) -> ModelKind {
        if self.collection() == Collection::CodePatterns || self == MemoryType::GithubCodeBlob {
            ModelKind::Code
        } else {
            ModelKind::Prose
        }
    }

    /// Smart truncation rule applied by the storage core.
    #[must_use]
    pub fn truncation_policy(self) -> TruncationPolicy {
        match self {
            MemoryType::UserMessage => TruncationPolicy::SentenceEnd { max_tokens: 2000 },
            MemoryType::AgentResponse => TruncationPolicy::SentenceEnd { max_tokens: 3000 },
            MemoryType::ErrorPattern | MemoryType::ErrorFix => TruncationPolicy::Structured {
                max_output_tokens: 1000,
            },
            _ => TruncationPolicy::CollectionCeiling,
        }
    }

    /// Machine-verifiable artifacts (diffs, CI output, code blobs) carry
    /// full authority; descriptive human text carries 0.4.
    #[must_use]
    pub fn source_authority(self) -> f64 {
        match self {
            MemoryType::GithubCommit | MemoryType::GithubCi | MemoryType::GithubCodeBlob => 1.0,
            _ => 0.4,
        }
    }

    /// Wire tag, e.g. `error_fix` or `github_pr`. Must stay in lockstep
    /// with the serde snake_case mapping.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            MemoryType::Implementation => "implementation",
            MemoryType::ErrorFix => "error_fix",
            MemoryType::ErrorPattern => "error_pattern",
            MemoryType::Refactor => "refactor",
            MemoryType::FilePattern => "file_pattern",
            MemoryType::Guideline => "guideline",
            MemoryType::Rule => "rule",
            MemoryType::Naming => "naming",
            MemoryType::Port => "port",
            MemoryType::Structure => "structure",
            MemoryType::BestPractice => "best_practice",
            MemoryType::AntiPattern => "anti_pattern",
            MemoryType::Decision => "decision",
            MemoryType::Session => "session",
            MemoryType::SessionSummary => "session_summary",
            MemoryType::Blocker => "blocker",
            MemoryType::Preference => "preference",
            MemoryType::Context => "context",
            MemoryType::ChatMemory => "chat_memory",
            MemoryType::AgentDecision => "agent_decision",
            MemoryType::UserMessage => "user_message",
            MemoryType::AgentResponse => "agent_response",
            MemoryType::GithubPr => "github_pr",
            MemoryType::GithubIssue => "github_issue",
            MemoryType::GithubCommit => "github_commit",
            MemoryType::GithubCi => "github_ci",
            MemoryType::GithubRelease => "github_release",
            MemoryType::GithubCodeBlob => "github_code_blob",
            MemoryType::JiraIssue => "jira_issue",
            MemoryType::JiraComment => "jira_comment",
            MemoryType::AgentHandoff => "agent_handoff",
            MemoryType::AgentMemory => "agent_memory",
            MemoryType::AgentTask => "agent_task",
            MemoryType::AgentInsight => "agent_insight",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown memory type: {s}"))
    }
}
