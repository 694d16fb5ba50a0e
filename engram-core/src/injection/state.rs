//! Per-session injection state.
//!
//! One JSON file per session in the system temp directory. The state is a
//! cache: a corrupt or missing file yields a fresh state, and overlapping
//! writers resolve last-writer-wins.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Everything the engine remembers between turns of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionSessionState {
    pub session_id: String,
    /// Point ids already injected this session; monotonically appended,
    /// cleared only on compaction.
    pub injected_point_ids: Vec<String>,
    pub last_query_embedding: Option<Vec<f32>>,
    pub topic_drift: f64,
    pub turn_count: u32,
    pub total_tokens_injected: usize,
}

impl InjectionSessionState {
    #[must_use]
    pub fn fresh(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            injected_point_ids: Vec::new(),
            last_query_embedding: None,
            topic_drift: 0.5,
            turn_count: 0,
            total_tokens_injected: 0,
        }
    }

    /// State file path for a session id.
    #[must_use]
    pub fn path(session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        std::env::temp_dir().join(format!("engram-{safe}-injection-state.json"))
    }

    /// Load the session's state; corrupt or absent files start fresh.
    #[must_use]
    pub fn load(session_id: &str) -> Self {
        let path = Self::path(session_id);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(session_id, error = %e, "corrupt injection state, starting fresh");
                Self::fresh(session_id)
            }),
            Err(_) => Self::fresh(session_id),
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path(&self.session_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Compaction reset: clear the dedup set but keep drift accounting
    /// spanning the compaction.
    pub fn reset_after_compact(&mut self) {
        self.injected_point_ids.clear();
    }

    #[must_use]
    pub fn has_injected(&self, id: &str) -> bool {
        self.injected_point_ids.iter().any(|known| known == id)
    }
}
