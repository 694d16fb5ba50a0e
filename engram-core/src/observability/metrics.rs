//! In-process metric registry with Prometheus exposition output.
//!
//! Counters, histograms and gauges keyed by label tuples. Hooks render
//! the registry once at exit and hand the text to a detached pusher so
//! the metrics path never blocks the assistant.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;
use tracing::warn;

/// Duration buckets (seconds), sized for hook latency contracts up to the
/// 5 s retrieval NFR ceiling.
const DURATION_BUCKETS: [f64; 10] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

type LabelKey = Vec<String>;

#[derive(Default)]
struct LabeledCounter {
    values: RwLock<BTreeMap<LabelKey, u64>>,
}

impl LabeledCounter {
    fn inc_by(&self, labels: LabelKey, amount: u64) {
        *self.values.write().entry(labels).or_default() += amount;
    }

    fn inc(&self, labels: LabelKey) {
        self.inc_by(labels, 1);
    }
}

#[derive(Default)]
struct LabeledGauge {
    values: RwLock<BTreeMap<LabelKey, f64>>,
}

impl LabeledGauge {
    fn set(&self, labels: LabelKey, value: f64) {
        self.values.write().insert(labels, value);
    }
}

#[derive(Default)]
struct HistogramState {
    bucket_counts: [u64; DURATION_BUCKETS.len()],
    count: u64,
    sum: f64,
}

#[derive(Default)]
struct LabeledHistogram {
    values: RwLock<BTreeMap<LabelKey, HistogramState>>,
}

impl LabeledHistogram {
    fn observe(&self, labels: LabelKey, value: f64) {
        let mut guard = self.values.write();
        let state = guard.entry(labels).or_default();
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            if value <= *bound {
                state.bucket_counts[i] += 1;
            }
        }
        state.count += 1;
        state.sum += value;
    }
}

/// All metric families of the memory layer.
#[derive(Default)]
pub struct MetricsRegistry {
    captures: LabeledCounter,           // hook, status, project, collection
    retrievals: LabeledCounter,         // collection, status
    embeddings: LabeledCounter,         // status
    dedups: LabeledCounter,             // project
    failures: LabeledCounter,           // component, code
    trigger_fires: LabeledCounter,      // trigger
    tokens: LabeledCounter,             // operation, direction
    hook_duration: LabeledHistogram,    // hook
    embedding_duration: LabeledHistogram,
    retrieval_duration: LabeledHistogram,
    collection_size: LabeledGauge, // collection, project
    queue_depth: LabeledGauge,     // queue
}

fn registry() -> &'static MetricsRegistry {
    static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MetricsRegistry::default)
}

pub fn record_capture(hook: &str, status: &str, project: &str, collection: &str) {
    registry().captures.inc(vec![
        hook.to_string(),
        status.to_string(),
        project.to_string(),
        collection.to_string(),
    ]);
}

pub fn record_retrieval(collection: &str, status: &str) {
    registry()
        .retrievals
        .inc(vec![collection.to_string(), status.to_string()]);
}

pub fn record_embedding(status: &str) {
    registry().embeddings.inc(vec![status.to_string()]);
}

pub fn record_dedup(project: &str) {
    registry().dedups.inc(vec![project.to_string()]);
}

pub fn record_failure(component: &str, code: &str) {
    registry()
        .failures
        .inc(vec![component.to_string(), code.to_string()]);
}

pub fn record_trigger_fire(trigger: &str) {
    registry().trigger_fires.inc(vec![trigger.to_string()]);
}

/// Token consumption by operation and direction. Zero counts are a bug at
/// the call site and are rejected with a warning.
pub fn record_tokens(operation: &str, direction: &str, count: usize) {
    if count == 0 {
        warn!(operation, direction, "rejecting zero token count");
        return;
    }
    registry().tokens.inc_by(
        vec![operation.to_string(), direction.to_string()],
        count as u64,
    );
}

pub fn observe_hook_duration(hook: &str, seconds: f64) {
    registry()
        .hook_duration
        .observe(vec![hook.to_string()], seconds);
}

pub fn observe_embedding_duration(seconds: f64) {
    registry().embedding_duration.observe(Vec::new(), seconds);
}

pub fn observe_retrieval_duration(seconds: f64) {
    registry().retrieval_duration.observe(Vec::new(), seconds);
}

pub fn set_collection_size(collection: &str, project: &str, size: u64) {
    #[allow(clippy::cast_precision_loss)]
    registry().collection_size.set(
        vec![collection.to_string(), project.to_string()],
        size as f64,
    );
}

pub fn set_queue_depth(queue: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    registry()
        .queue_depth
        .set(vec![queue.to_string()], depth as f64);
}

/// Render the whole registry in Prometheus exposition format.
#[must_use]
pub fn render() -> String {
    let r = registry();
    let mut out = String::new();

    render_counter(&mut out, "engram_captures_total", &["hook", "status", "project", "collection"], &r.captures);
    render_counter(&mut out, "engram_retrievals_total", &["collection", "status"], &r.retrievals);
    render_counter(&mut out, "engram_embedding_requests_total", &["status"], &r.embeddings);
    render_counter(&mut out, "engram_dedup_events_total", &["project"], &r.dedups);
    render_counter(&mut out, "engram_failures_total", &["component", "error_code"], &r.failures);
    render_counter(&mut out, "engram_trigger_fires_total", &["trigger"], &r.trigger_fires);
    render_counter(&mut out, "engram_tokens_consumed_total", &["operation", "direction"], &r.tokens);
    render_histogram(&mut out, "engram_hook_duration_seconds", &["hook"], &r.hook_duration);
    render_histogram(&mut out, "engram_embedding_duration_seconds", &[], &r.embedding_duration);
    render_histogram(&mut out, "engram_retrieval_duration_seconds", &[], &r.retrieval_duration);
    render_gauge(&mut out, "engram_collection_size", &["collection", "project"], &r.collection_size);
    render_gauge(&mut out, "engram_queue_depth", &["queue"], &r.queue_depth);

    out
}

/// POST the exposition text to the configured push gateway.
pub async fn push_to_gateway(gateway_url: &str, job: &str, body: String) -> Result<(), String> {
    let url = format!("{gateway_url}/metrics/job/{job}");
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;
    let response = client
        .post(&url)
        .header("Content-Type", "text/plain")
        .body(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("push gateway returned {}", response.status()))
    }
}

fn label_pairs(names: &[&str], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", value.replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn render_counter(out: &mut String, name: &str, labels: &[&str], counter: &LabeledCounter) {
    let values = counter.values.read();
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "# TYPE {name} counter");
    for (key, value) in values.iter() {
        let _ = writeln!(out, "{name}{} {value}", label_pairs(labels, key));
    }
}

fn render_gauge(out: &mut String, name: &str, labels: &[&str], gauge: &LabeledGauge) {
    let values = gauge.values.read();
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "# TYPE {name} gauge");
    for (key, value) in values.iter() {
        let _ = writeln!(out, "{name}{} {value}", label_pairs(labels, key));
    }
}

fn render_histogram(out: &mut String, name: &str, labels: &[&str], histogram: &LabeledHistogram) {
    let values = histogram.values.read();
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "# TYPE {name} histogram");
    for (key, state) in values.iter() {
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            let mut with_le = key.clone();
            with_le.push(format!("{bound}"));
            let mut names: Vec<&str> = labels.to_vec();
            names.push("le");
            let _ = writeln!(
                out,
                "{name}_bucket{} {}",
                label_pairs(&names, &with_le),
                state.bucket_counts[i]
            );
        }
        let mut names: Vec<&str> = labels.to_vec();
        names.push("le");
        let mut with_inf = key.clone();
        with_inf.push("+Inf".to_string());
        let _ = writeln!(
            out,
            "{name}_bucket{} {}",
            label_pairs(&names, &with_inf),
            state.count
        );
        let _ = writeln!(out, "{name}_sum{} {}", label_pairs(labels, key), state.sum);
        let _ = writeln!(out, "{name}_count{} {}", label_pairs(labels, key), state.count);
    }
}
