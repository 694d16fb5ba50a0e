use super::{Collection, MemoryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Handler names allowed to originate a capture. Writes with any other
/// `source_hook` fail validation.
pub const SOURCE_HOOK_WHITELIST: &[&str] = &[
    "session_start",
    "user_prompt_capture",
    "post_tool_capture",
    "agent_response_capture",
    "error_pattern_capture",
    "pre_compact_save",
    "manual_save",
    "retry_processor",
    "github_sync",
    "jira_sync",
];

/// Embedding lifecycle of a stored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Pending,
    Complete,
    Failed,
}

/// One vector-store point payload.
///
/// `content_hash` doubles as the seed for the deterministic point id, so
/// the same content always converges on a single point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    pub content_hash: String,
    pub group_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub source_hook: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub embedding_status: EmbeddingStatus,
    pub embedding_model: String,
    // Freshness fields (v2.0.6+)
    pub source_authority: f64,
    pub decay_score: f64,
    pub freshness_status: String,
    pub is_current: bool,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_references: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Type-specific extras (connector ids, classification fields, …).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Namespace for uuid5 point-id derivation. Changing it would orphan every
/// existing point.
pub(crate) const POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x7e, 0x2b, 0x1a, 0x90, 0x4f, 0xd3, 0x45, 0x1c, 0x8a, 0x6e, 0x15, 0x9c, 0xe4, 0x02, 0x7b,
    0x3d,
]);

impl MemoryRecord {
    /// Deterministic point id: `uuid5(namespace, content_hash)`.
    #[must_use]
    pub fn point_id(&self) -> Uuid {
        Uuid::new_v5(&POINT_NAMESPACE, self.content_hash.as_bytes())
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        self.memory_type.collection()
    }
}

/// Terminal status of a single storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Stored,
    Duplicate,
    Blocked,
    Queued,
}

impl StoreStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StoreStatus::Stored => "stored",
            StoreStatus::Duplicate => "duplicate",
            StoreStatus::Blocked => "blocked",
            StoreStatus::Queued => "queued",
        }
    }
}

/// What the canonical write path returns to every caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub status: StoreStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_status: Option<EmbeddingStatus>,
}

impl StoreOutcome {
    #[must_use]
    pub fn blocked() -> Self {
        Self {
            status: StoreStatus::Blocked,
            memory_id: None,
            embedding_status: None,
        }
    }

    #[must_use]
    pub fn duplicate(existing: Uuid) -> Self {
        Self {
            status: StoreStatus::Duplicate,
            memory_id: Some(existing),
            embedding_status: None,
        }
    }

    #[must_use]
    pub fn queued() -> Self {
        Self {
            status: StoreStatus::Queued,
            memory_id: None,
            embedding_status: None,
        }
    }

    #[must_use]
    pub fn stored(id: Uuid, embedding_status: EmbeddingStatus) -> Self {
        Self {
            status: StoreStatus::Stored,
            memory_id: Some(id),
            embedding_status: Some(embedding_status),
        }
    }
}

/// Hex-encoded SHA-256 of the original (pre-masking, pre-truncation)
/// content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
