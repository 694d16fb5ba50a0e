//! Compiled pattern sets for the scanner layers.

use super::{Finding, FindingKind};
use regex::Regex;
use std::sync::OnceLock;

struct Layer1Pattern {
    kind: FindingKind,
    regex: Regex,
}

fn layer1_patterns() -> &'static [Layer1Pattern] {
    static PATTERNS: OnceLock<Vec<Layer1Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        let compile = |kind, pattern: &str| Layer1Pattern {
            kind,
            regex: Regex::new(pattern).unwrap(),
        };
        vec![
            // Source-hosting personal access tokens.
            compile(FindingKind::VcsToken, r"\bgh[pousr]_[A-Za-z0-9]{36,}\b"),
            compile(FindingKind::VcsToken, r"\bglpat-[A-Za-z0-9_-]{20,}\b"),
            // Cloud provider keys.
            compile(FindingKind::CloudKey, r"\bAKIA[0-9A-Z]{16,}\b"),
            compile(FindingKind::CloudKey, r"\bxox[baprs]-[A-Za-z0-9-]{10,}\b"),
            compile(
                FindingKind::PrivateKey,
                r"-----BEGIN (?:RSA |EC |OPENSSH |DSA )?PRIVATE KEY-----",
            ),
            // Loose PII.
            compile(
                FindingKind::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            compile(
                FindingKind::Phone,
                r"\+?\d{1,3}[-. ]?\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b",
            ),
            compile(FindingKind::Ipv4, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ]
    })
}

/// Layer 1: raw regex findings, unfiltered.
pub(super) fn layer1_findings(content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for pattern in layer1_patterns() {
        for m in pattern.regex.find_iter(content) {
            if pattern.kind == FindingKind::Ipv4 && !is_maskable_ip(m.as_str()) {
                continue;
            }
            findings.push(Finding {
                kind: pattern.kind,
                start: m.start(),
                end: m.end(),
            });
        }
    }
    findings
}

/// Context words that mark a nearby match as deliberately fake.
const EXAMPLE_MARKERS: &[&str] = &[
    "example",
    "sample",
    "placeholder",
    "dummy",
    "fake",
    "your_token",
    "your-token",
    "redacted",
    "<token>",
];

/// Layer 2: drop a finding when the surrounding context says it is an
/// example rather than a live credential. Only applied to secrets; real
/// PII is masked regardless of phrasing.
pub(super) fn is_contextual_false_positive(content: &str, finding: &Finding) -> bool {
    if !finding.kind.blocks() {
        return false;
    }
    let window_start = finding.start.saturating_sub(60);
    let window = content[window_start..finding.start].to_lowercase();
    EXAMPLE_MARKERS.iter().any(|marker| window.contains(marker))
}

/// Loopback, unspecified and RFC-1918 addresses stay in the clear; they
/// identify nothing outside the host.
fn is_maskable_ip(candidate: &str) -> bool {
    let octets: Vec<u8> = candidate
        .split('.')
        .filter_map(|part| part.parse().ok())
        .collect();
    let [a, b, _, _] = octets[..] else {
        return false;
    };
    let private = a == 127
        || a == 0
        || a == 10
        || (a == 192 && b == 168)
        || (a == 172 && (16..=31).contains(&b));
    !private
}

#[allow(clippy::unwrap_used)]
fn honorific_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?").unwrap()
    })
}

/// Layer 3: conservative person-name detection (honorific + capitalized
/// name). Kept deliberately narrow; the cost of a false mask on source
/// code is higher than a missed name.
pub(super) fn layer3_person_names(content: &str) -> Vec<Finding> {
    honorific_name_regex()
        .find_iter(content)
        .map(|m| Finding {
            kind: FindingKind::PersonName,
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_not_maskable() {
        assert!(!is_maskable_ip("127.0.0.1"));
        assert!(!is_maskable_ip("10.1.2.3"));
        assert!(!is_maskable_ip("192.168.0.4"));
        assert!(!is_maskable_ip("172.20.0.1"));
        assert!(is_maskable_ip("203.0.113.50"));
    }

    #[test]
    fn honorific_names_are_detected() {
        let findings = layer3_person_names("Reviewed by Dr. Jane Doe yesterday");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::PersonName);
    }
}
