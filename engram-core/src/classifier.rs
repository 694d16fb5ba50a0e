//! LLM classification contract and worker-side task processing.
//!
//! The classifier is the only component allowed to mutate a record's
//! `type` after the initial write, and only above the confidence
//! threshold. Everything else about a task failure is log-and-continue.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::observability::trace::{emit_span, TraceSpan};
use crate::queue::ClassificationTask;
use crate::types::{Collection, MemoryType};
use crate::vector::VectorStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::{debug, info};

/// What the classifier returns for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classified_type: MemoryType,
    pub confidence: f64,
    pub provider_used: String,
    pub reasoning: String,
    pub was_reclassified: bool,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// content → refined type label.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        content: &str,
        collection: Collection,
        current_type: MemoryType,
    ) -> Result<ClassificationResult>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ModelVerdict {
    #[serde(rename = "type")]
    type_tag: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// HTTP classifier against a local LLM endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpClassifier {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Classifier(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.classifier_url.clone(),
            model: config.classifier_model.clone(),
        })
    }

    fn build_prompt(content: &str, collection: Collection, current_type: MemoryType) -> String {
        let candidates: Vec<&str> = match collection {
            Collection::CodePatterns => vec![
                "implementation",
                "error_fix",
                "error_pattern",
                "refactor",
                "file_pattern",
            ],
            Collection::Conventions => vec![
                "guideline",
                "rule",
                "naming",
                "port",
                "structure",
                "best_practice",
                "anti_pattern",
            ],
            Collection::Discussions => vec![
                "decision",
                "session_summary",
                "blocker",
                "preference",
                "context",
                "user_message",
                "agent_response",
            ],
        };
        format!(
            "Classify this development memory into exactly one type.\n\
             Current guess: {current_type}\n\
             Allowed types: {}\n\n\
             Content:\n{content}\n\n\
             Respond with JSON: {{\"type\": \"...\", \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}",
            candidates.join(", ")
        )
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        content: &str,
        collection: Collection,
        current_type: MemoryType,
    ) -> Result<ClassificationResult> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(content, collection, current_type),
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Classifier(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Classifier(format!(
                "classifier endpoint returned {}",
                response.status()
            )));
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Classifier(e.to_string()))?;
        let verdict: ModelVerdict = serde_json::from_str(&body.response)
            .map_err(|e| Error::Classifier(format!("unparseable verdict: {e}")))?;

        let classified_type = MemoryType::from_str(&verdict.type_tag)
            .map_err(Error::Classifier)?;

        Ok(ClassificationResult {
            classified_type,
            confidence: verdict.confidence.clamp(0.0, 1.0),
            provider_used: "ollama".to_string(),
            reasoning: verdict.reasoning,
            was_reclassified: classified_type != current_type,
            model_name: self.model.clone(),
            input_tokens: body.prompt_eval_count,
            output_tokens: body.eval_count,
        })
    }
}

/// Process one queued task: classify, and above the threshold write the
/// refined type back into the point's payload. Returns true when the task
/// is done (including the below-threshold case, which is done-by-policy).
pub async fn process_classification_task(
    task: &ClassificationTask,
    classifier: &dyn Classifier,
    store: &dyn VectorStore,
    config: &Config,
) -> Result<bool> {
    // Real wall-clock bounds around the LLM call, not emission time.
    let started = Utc::now();
    let outcome = classifier
        .classify(&task.content, task.collection, task.current_type)
        .await;
    let finished = Utc::now();

    let mut span = TraceSpan::begin("classify");
    span.start_time = started;
    span.end_time = finished;
    span.session_id = task.session_id.clone();
    span.project_id = Some(task.group_id.clone());
    if let Some(trace_id) = &task.trace_id {
        span.trace_id = trace_id.clone();
    }
    span.input = json!(task.content);

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            span.ok = false;
            span.output = json!({ "error": e.to_string() });
            emit_span(config, &span);
            return Err(e);
        }
    };

    span.model = Some(result.model_name.clone());
    span.input_tokens = result.input_tokens;
    span.output_tokens = result.output_tokens;
    span.output = json!({
        "classified_type": result.classified_type.tag(),
        "confidence": result.confidence,
        "was_reclassified": result.was_reclassified,
        "reasoning": result.reasoning,
    });

    if result.confidence >= config.classification_confidence_threshold {
        let mut updates = Map::new();
        updates.insert("type".into(), Value::from(result.classified_type.tag()));
        updates.insert(
            "classification_confidence".into(),
            json!(result.confidence),
        );
        updates.insert(
            "classification_provider".into(),
            Value::from(result.provider_used.clone()),
        );
        updates.insert(
            "classification_reasoning".into(),
            Value::from(result.reasoning.clone()),
        );
        updates.insert("classified_at".into(), json!(Utc::now()));
        updates.insert("is_classified".into(), Value::from(true));

        store
            .set_payload(task.collection, task.point_id, updates)
            .await?;
        info!(
            point_id = %task.point_id,
            old_type = %task.current_type,
            new_type = %result.classified_type,
            confidence = result.confidence,
            "classification written back"
        );
    } else {
        debug!(
            point_id = %task.point_id,
            confidence = result.confidence,
            "classification below threshold, type unchanged"
        );
    }

    emit_span(config, &span);
    Ok(true)
}
