//! Process-wide configuration.
//!
//! Loaded lazily from the environment, memoized for the life of the
//! process, and resettable for tests. Every knob has a documented default
//! so a bare environment still produces a working (local) configuration.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

static CONFIG: RwLock<Option<Arc<Config>>> = RwLock::new(None);

/// All tunables read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for queues, logs and the trace buffer.
    pub install_dir: PathBuf,
    /// Root for the injection audit log.
    pub audit_dir: PathBuf,
    /// Advisory lock serializing retry-queue/backfill processors.
    pub lock_file: PathBuf,

    // Vector store
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub vector_dim: u64,

    // Embedding service
    pub embedding_url: String,
    pub embedding_model_prose: String,
    pub embedding_model_code: String,
    pub embedding_timeout: Duration,
    pub embedding_max_retries: u32,

    // Security scanning
    pub security_scan_enabled: bool,
    pub security_ner_enabled: bool,

    // Classifier
    pub classifier_enabled: bool,
    pub classifier_url: String,
    pub classifier_model: String,
    pub classification_confidence_threshold: f64,

    // Progressive injection
    pub injection_enabled: bool,
    pub injection_confidence_threshold: f64,
    pub injection_budget_floor: usize,
    pub injection_budget_ceiling: usize,
    pub injection_quality_weight: f64,
    pub injection_density_weight: f64,
    pub injection_drift_weight: f64,
    pub max_retrievals: usize,

    // Freshness
    pub decay_enabled: bool,
    pub auto_update_enabled: bool,

    // Agent mode
    pub agent_mode_enabled: bool,
    pub agent_id: String,

    // Connectors
    pub github_repo: Option<String>,
    pub github_token: Option<String>,
    pub jira_instance: Option<String>,
    pub jira_token: Option<String>,

    // Observability
    pub push_gateway_url: Option<String>,
    pub trace_backend_url: Option<String>,
    pub trace_buffer_max_bytes: u64,

    // Hook runtime
    pub hook_timeout: Duration,

    // Retention
    pub session_retention: usize,
}

impl Config {
    /// Read configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        let install_dir = env_path("ENGRAM_INSTALL_DIR", || {
            PathBuf::from(&home).join(".engram")
        });
        let audit_dir = env_path("ENGRAM_AUDIT_DIR", || install_dir.clone());
        let lock_file = env_path("ENGRAM_LOCK_FILE", || install_dir.join("backfill.lock"));

        Self {
            audit_dir,
            lock_file,
            qdrant_url: env_str("ENGRAM_QDRANT_URL", "http://localhost:6334"),
            qdrant_api_key: std::env::var("ENGRAM_QDRANT_API_KEY").ok(),
            vector_dim: env_parse("ENGRAM_VECTOR_DIM", 768),
            embedding_url: env_str("ENGRAM_EMBEDDING_URL", "http://localhost:11434"),
            embedding_model_prose: env_str("ENGRAM_EMBEDDING_MODEL_PROSE", "nomic-embed-text"),
            embedding_model_code: env_str("ENGRAM_EMBEDDING_MODEL_CODE", "nomic-embed-code"),
            embedding_timeout: Duration::from_secs(env_parse("ENGRAM_EMBEDDING_TIMEOUT_SECS", 10)),
            embedding_max_retries: env_parse("ENGRAM_EMBEDDING_MAX_RETRIES", 3),
            security_scan_enabled: env_bool("ENGRAM_SECURITY_SCAN_ENABLED", true),
            security_ner_enabled: env_bool("ENGRAM_SECURITY_NER_ENABLED", false),
            classifier_enabled: env_bool("ENGRAM_CLASSIFIER_ENABLED", true),
            classifier_url: env_str("ENGRAM_CLASSIFIER_URL", "http://localhost:11434"),
            classifier_model: env_str("ENGRAM_CLASSIFIER_MODEL", "llama3.2:3b"),
            classification_confidence_threshold: env_parse(
                "ENGRAM_CLASSIFICATION_CONFIDENCE",
                0.7,
            ),
            injection_enabled: env_bool("ENGRAM_INJECTION_ENABLED", true),
            injection_confidence_threshold: env_parse("ENGRAM_INJECTION_CONFIDENCE", 0.6),
            injection_budget_floor: env_parse("ENGRAM_INJECTION_BUDGET_FLOOR", 500),
            injection_budget_ceiling: env_parse("ENGRAM_INJECTION_BUDGET_CEILING", 1500),
            injection_quality_weight: env_parse("ENGRAM_INJECTION_QUALITY_WEIGHT", 0.5),
            injection_density_weight: env_parse("ENGRAM_INJECTION_DENSITY_WEIGHT", 0.3),
            injection_drift_weight: env_parse("ENGRAM_INJECTION_DRIFT_WEIGHT", 0.2),
            max_retrievals: env_parse("ENGRAM_MAX_RETRIEVALS", 10),
            decay_enabled: env_bool("ENGRAM_DECAY_ENABLED", false),
            auto_update_enabled: env_bool("ENGRAM_AUTO_UPDATE_ENABLED", false),
            agent_mode_enabled: env_bool("ENGRAM_AGENT_MODE_ENABLED", false),
            agent_id: env_str("ENGRAM_AGENT_ID", "parzival"),
            github_repo: std::env::var("ENGRAM_GITHUB_REPO").ok(),
            github_token: std::env::var("ENGRAM_GITHUB_TOKEN").ok(),
            jira_instance: std::env::var("ENGRAM_JIRA_INSTANCE").ok(),
            jira_token: std::env::var("ENGRAM_JIRA_TOKEN").ok(),
            push_gateway_url: std::env::var("ENGRAM_PUSH_GATEWAY_URL").ok(),
            trace_backend_url: std::env::var("ENGRAM_TRACE_BACKEND_URL").ok(),
            trace_buffer_max_bytes: env_parse("ENGRAM_TRACE_BUFFER_MAX_BYTES", 10 * 1024 * 1024),
            hook_timeout: Duration::from_secs(env_parse("HOOK_TIMEOUT", 60)),
            session_retention: env_parse("ENGRAM_SESSION_RETENTION", 50),
            install_dir,
        }
    }

    /// Queue directory under the install root.
    #[must_use]
    pub fn queue_dir(&self) -> PathBuf {
        self.install_dir.join("queue")
    }

    /// Pending retry queue file.
    #[must_use]
    pub fn retry_queue_file(&self) -> PathBuf {
        self.queue_dir().join("pending_queue.jsonl")
    }

    /// Dead-letter file for entries past `max_retries`.
    #[must_use]
    pub fn retry_dlq_file(&self) -> PathBuf {
        self.queue_dir().join("retry_queue_dlq.jsonl")
    }

    /// Classification task directory.
    #[must_use]
    pub fn classification_queue_dir(&self) -> PathBuf {
        self.queue_dir().join("classification")
    }

    /// Disk-backed trace span buffer.
    #[must_use]
    pub fn trace_buffer_dir(&self) -> PathBuf {
        self.install_dir.join("traces")
    }

    /// User-visible activity log.
    #[must_use]
    pub fn activity_log_file(&self) -> PathBuf {
        self.install_dir.join("logs").join("activity.log")
    }

    /// Tier-2 injection audit log.
    #[must_use]
    pub fn injection_audit_file(&self) -> PathBuf {
        self.audit_dir.join("logs").join("injection-log.jsonl")
    }

    /// Embedding model id for a given routing kind.
    #[must_use]
    pub fn embedding_model(&self, kind: crate::types::ModelKind) -> &str {
        match kind {
            crate::types::ModelKind::Prose => &self.embedding_model_prose,
            crate::types::ModelKind::Code => &self.embedding_model_code,
        }
    }
}

/// Get the memoized process-wide configuration.
#[must_use]
pub fn get_config() -> Arc<Config> {
    if let Some(config) = CONFIG.read().as_ref() {
        return Arc::clone(config);
    }
    let mut guard = CONFIG.write();
    if let Some(config) = guard.as_ref() {
        return Arc::clone(config);
    }
    let config = Arc::new(Config::from_env());
    *guard = Some(Arc::clone(&config));
    config
}

/// Drop the memoized configuration so the next [`get_config`] re-reads the
/// environment. Test-only escape hatch; also used by long-lived daemons on
/// SIGHUP-style reloads.
pub fn reset_config() {
    *CONFIG.write() = None;
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    std::env::var(key).map_or_else(|_| default(), PathBuf::from)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn defaults_are_sane() {
        reset_config();
        let config = get_config();
        assert_eq!(config.injection_budget_floor, 500);
        assert_eq!(config.injection_budget_ceiling, 1500);
        assert!((config.injection_confidence_threshold - 0.6).abs() < 1e-9);
        let weight_sum = config.injection_quality_weight
            + config.injection_density_weight
            + config.injection_drift_weight;
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert_eq!(config.vector_dim, 768);
    }

    #[test]
    #[serial_test::serial]
    fn memoized_until_reset() {
        reset_config();
        let first = get_config();
        let second = get_config();
        assert!(Arc::ptr_eq(&first, &second));
        reset_config();
        let third = get_config();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
