//! Three-layer secret and PII detection on the write path.
//!
//! Layer 1 is pure regex over known token shapes and PII formats. Layer 2
//! walks the layer-1 findings and drops those whose surrounding context
//! marks them as examples or placeholders. Layer 3 is a conservative
//! named-entity pass for person names, disabled by default.
//!
//! The scanner never blocks storage on its own failure: callers treat a
//! scan error as `pass` with a logged warning.

mod patterns;

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// What the write path must do with the scanned content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    Pass,
    Masked,
    Blocked,
}

/// Category of a single detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    VcsToken,
    CloudKey,
    PrivateKey,
    Email,
    Phone,
    Ipv4,
    PersonName,
}

impl FindingKind {
    /// Hard secrets block the write; loose PII is masked in place.
    #[must_use]
    pub fn blocks(self) -> bool {
        matches!(
            self,
            FindingKind::VcsToken | FindingKind::CloudKey | FindingKind::PrivateKey
        )
    }

    #[must_use]
    pub fn mask(self) -> &'static str {
        match self {
            FindingKind::VcsToken => "[TOKEN_REDACTED]",
            FindingKind::CloudKey => "[KEY_REDACTED]",
            FindingKind::PrivateKey => "[PRIVATE_KEY_REDACTED]",
            FindingKind::Email => "[EMAIL_REDACTED]",
            FindingKind::Phone => "[PHONE_REDACTED]",
            FindingKind::Ipv4 => "[IP_REDACTED]",
            FindingKind::PersonName => "[NAME_REDACTED]",
        }
    }
}

/// One detection with its byte span in the original content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub start: usize,
    pub end: usize,
}

/// Full scanner verdict.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub action: ScanAction,
    pub content: String,
    pub findings: Vec<Finding>,
    pub layers_executed: u8,
    pub scan_duration_ms: f64,
}

impl ScanResult {
    fn pass(content: &str, layers: u8, started: Instant) -> Self {
        Self {
            action: ScanAction::Pass,
            content: content.to_string(),
            findings: Vec::new(),
            layers_executed: layers,
            scan_duration_ms: elapsed_ms(started),
        }
    }
}

/// Run the configured layers over `content`.
#[must_use]
pub fn scan(content: &str, config: &Config) -> ScanResult {
    let started = Instant::now();

    if !config.security_scan_enabled {
        return ScanResult::pass(content, 0, started);
    }

    // Layer 1: regex detection.
    let mut findings = patterns::layer1_findings(content);

    // Layer 2: contextual disambiguation.
    findings.retain(|f| !patterns::is_contextual_false_positive(content, f));
    let mut layers = 2;

    // Layer 3: named-entity pass (opt-in).
    if config.security_ner_enabled {
        findings.extend(patterns::layer3_person_names(content));
        layers = 3;
    }
    drop_overlaps(&mut findings);

    if findings.is_empty() {
        return ScanResult::pass(content, layers, started);
    }

    if findings.iter().any(|f| f.kind.blocks()) {
        debug!(
            findings = findings.len(),
            "security scan blocked hard secret"
        );
        return ScanResult {
            action: ScanAction::Blocked,
            content: content.to_string(),
            findings,
            layers_executed: layers,
            scan_duration_ms: elapsed_ms(started),
        };
    }

    // Mask right-to-left so earlier spans stay valid.
    let mut masked = content.to_string();
    let mut ordered: Vec<&Finding> = findings.iter().collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.start));
    for finding in ordered {
        masked.replace_range(finding.start..finding.end, finding.kind.mask());
    }

    ScanResult {
        action: ScanAction::Masked,
        content: masked,
        findings,
        layers_executed: layers,
        scan_duration_ms: elapsed_ms(started),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Masking rewrites spans in place, so overlapping findings (two patterns
/// matching the same bytes) must collapse to the first.
fn drop_overlaps(findings: &mut Vec<Finding>) {
    findings.sort_by_key(|f| (f.start, f.end));
    let mut last_end = 0;
    findings.retain(|f| {
        if f.start < last_end {
            return false;
        }
        last_end = f.end;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        crate::config::Config::from_env()
    }

    #[test]
    fn github_pat_is_blocked() {
        let content = format!("export TOKEN=ghp_{}", "A".repeat(36));
        let result = scan(&content, &test_config());
        assert_eq!(result.action, ScanAction::Blocked);
        assert!(result.findings.iter().any(|f| f.kind == FindingKind::VcsToken));
    }

    #[test]
    fn aws_key_is_blocked() {
        let content = "aws_access_key_id = AKIAIOSFODNN7EXAMPLE77";
        let result = scan(content, &test_config());
        assert_eq!(result.action, ScanAction::Blocked);
    }

    #[test]
    fn email_is_masked_not_blocked() {
        let result = scan("Contact dev@acme.io for access", &test_config());
        assert_eq!(result.action, ScanAction::Masked);
        assert!(result.content.contains("[EMAIL_REDACTED]"));
        assert!(!result.content.contains("dev@acme.io"));
    }

    #[test]
    fn phone_is_masked() {
        let result = scan("Call +1-555-867-5309 after lunch", &test_config());
        assert_eq!(result.action, ScanAction::Masked);
        assert!(result.content.contains("[PHONE_REDACTED]"));
    }

    #[test]
    fn clean_content_passes() {
        let result = scan("fn main() { println!(\"hello\"); }", &test_config());
        assert_eq!(result.action, ScanAction::Pass);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn example_token_passes_layer2() {
        let content = format!("# example token: ghp_{}", "x".repeat(36));
        let result = scan(&content, &test_config());
        assert_eq!(result.action, ScanAction::Pass);
    }

    #[test]
    fn loopback_ip_is_not_masked() {
        let result = scan("listening on 127.0.0.1 for requests", &test_config());
        assert_eq!(result.action, ScanAction::Pass);
    }

    #[test]
    fn public_ip_is_masked() {
        let result = scan("attacker came from 203.0.113.50 overnight", &test_config());
        assert_eq!(result.action, ScanAction::Masked);
        assert!(result.content.contains("[IP_REDACTED]"));
    }

    #[test]
    fn multiple_pii_spans_all_masked() {
        let result = scan(
            "a@b.io wrote to c@d.io about the outage",
            &test_config(),
        );
        assert_eq!(result.action, ScanAction::Masked);
        assert_eq!(
            result.content.matches("[EMAIL_REDACTED]").count(),
            2,
            "both addresses masked"
        );
    }
}
