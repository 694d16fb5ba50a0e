//! Per-turn injection arithmetic: drift, budget, greedy fill, formatting,
//! audit.

use crate::config::Config;
use crate::search::SearchHit;
use crate::tokens::count_tokens;
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use tracing::warn;

/// Cosine distance between the current and previous query embeddings.
/// First turn (no previous) is the neutral 0.5.
#[must_use]
pub fn compute_topic_drift(current: Option<&[f32]>, previous: Option<&[f32]>) -> f64 {
    let (Some(current), Some(previous)) = (current, previous) else {
        return 0.5;
    };
    if current.len() != previous.len() || current.is_empty() {
        return 0.5;
    }
    let dot: f32 = current.iter().zip(previous).map(|(a, b)| a * b).sum();
    let norm_a: f32 = current.iter().map(|a| a * a).sum::<f32>().sqrt();
    let norm_b: f32 = previous.iter().map(|b| b * b).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.5;
    }
    let cosine = f64::from((dot / (norm_a * norm_b)).clamp(-1.0, 1.0));
    (1.0 - cosine).clamp(0.0, 1.0)
}

/// Blend quality, density and drift into a token budget in
/// `[floor, ceiling]`.
///
/// Quality is the best score, density the fraction of results above the
/// confidence threshold, drift the cosine distance from the previous
/// turn. All three in [0, 1]; weights sum to 1; the blend maps linearly
/// onto the budget range.
#[must_use]
pub fn compute_adaptive_budget(
    best_score: f64,
    results: &[SearchHit],
    topic_drift: f64,
    config: &Config,
) -> usize {
    let quality = best_score.clamp(0.0, 1.0);
    let density = if results.is_empty() {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let above = results
            .iter()
            .filter(|r| f64::from(r.score) >= config.injection_confidence_threshold)
            .count() as f64;
        #[allow(clippy::cast_precision_loss)]
        let total = results.len() as f64;
        above / total
    };
    let drift = topic_drift.clamp(0.0, 1.0);

    let blend = quality * config.injection_quality_weight
        + density * config.injection_density_weight
        + drift * config.injection_drift_weight;

    let floor = config.injection_budget_floor;
    let ceiling = config.injection_budget_ceiling.max(floor);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let budget = floor + ((ceiling - floor) as f64 * blend).round() as usize;
    budget.clamp(floor, ceiling)
}

/// Greedy budget fill: descending score, skip already-injected ids, skip
/// entries that do not fit, keep trying smaller later entries. Never
/// exceeds the budget.
#[must_use]
pub fn select_results_greedy(
    results: &[SearchHit],
    budget: usize,
    excluded_ids: &[String],
) -> (Vec<SearchHit>, usize) {
    let mut selected = Vec::new();
    let mut remaining = budget;
    let mut used = 0;

    for hit in results {
        if hit.content.trim().is_empty() {
            continue;
        }
        let id = hit.id.to_string();
        if excluded_ids.iter().any(|known| *known == id) {
            continue;
        }
        let cost = count_tokens(&hit.content);
        if cost > remaining {
            // Keep scanning: a smaller later entry may still fit.
            continue;
        }
        remaining -= cost;
        used += cost;
        selected.push(hit.clone());
    }

    (selected, used)
}

/// Render the selected entries as the single context block the assistant
/// sees.
#[must_use]
pub fn format_injection_output(selected: &[SearchHit], tier: u8) -> String {
    if selected.is_empty() {
        return String::new();
    }
    let mut out = String::from("<retrieved_context>\n");
    if tier == 1 {
        out.push_str("Relevant project memory from previous sessions:\n\n");
    } else {
        out.push_str("Relevant memories for this request:\n\n");
    }
    for hit in selected {
        out.push_str(&format!(
            "[{} | {} | score {:.2}]\n{}\n\n",
            hit.memory_type,
            hit.collection.name(),
            hit.score,
            hit.content.trim()
        ));
    }
    out.push_str("</retrieved_context>");
    out
}

/// One audit row per Tier-2 invocation.
#[derive(Debug, Serialize)]
pub struct InjectionAuditEvent<'a> {
    pub tier: u8,
    pub trigger: &'a str,
    pub project: &'a str,
    pub session_id: &'a str,
    pub results_considered: usize,
    pub results_selected: usize,
    pub tokens_used: usize,
    pub budget: usize,
    pub best_score: f64,
    pub skipped_confidence: bool,
    pub topic_drift: f64,
    pub collections_searched: Vec<String>,
    pub ts: String,
}

impl<'a> InjectionAuditEvent<'a> {
    #[must_use]
    pub fn skip(
        trigger: &'a str,
        project: &'a str,
        session_id: &'a str,
        results_considered: usize,
        best_score: f64,
        collections_searched: Vec<String>,
    ) -> Self {
        Self {
            tier: 2,
            trigger,
            project,
            session_id,
            results_considered,
            results_selected: 0,
            tokens_used: 0,
            budget: 0,
            best_score,
            skipped_confidence: true,
            topic_drift: 0.0,
            collections_searched,
            ts: Utc::now().to_rfc3339(),
        }
    }
}

/// Append an audit row to the injection log. Best-effort.
pub fn log_injection_event(config: &Config, event: &InjectionAuditEvent<'_>) {
    let path = config.injection_audit_file();
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(line) = serde_json::to_string(event) else {
        return;
    };
    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut file) => {
            let _ = writeln!(file, "{line}");
        }
        Err(e) => warn!(error = %e, "failed to append injection audit event"),
    }
}
