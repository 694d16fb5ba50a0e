//! Embedding service client with per-model routing.
//!
//! Prose and code content embed through different models; both go to the
//! same HTTP endpoint. Transient network failures retry with exponential
//! backoff; anything else surfaces immediately so the write path can fall
//! back to a zero vector.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::ModelKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Text → fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts with the model routed for `kind`.
    async fn embed(&self, texts: &[String], kind: ModelKind) -> Result<Vec<Vec<f32>>>;

    /// Model identifier recorded in the payload.
    fn model_id(&self, kind: ModelKind) -> String;

    /// Cheap liveness probe.
    async fn healthy(&self) -> bool;
}

/// Convenience for the common single-text case.
pub async fn embed_one(embedder: &dyn Embedder, text: &str, kind: ModelKind) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[text.to_string()], kind).await?;
    vectors
        .pop()
        .ok_or_else(|| Error::Embedding("service returned no vectors".into()))
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model_prose: String,
    model_code: String,
    max_retries: u32,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.embedding_timeout)
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.embedding_url.clone(),
            model_prose: config.embedding_model_prose.clone(),
            model_code: config.embedding_model_code.clone(),
            max_retries: config.embedding_max_retries,
            timeout: config.embedding_timeout,
        })
    }

    fn model(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Prose => &self.model_prose,
            ModelKind::Code => &self.model_code,
        }
    }

    async fn request(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                // Timeouts and refused connections are the transient class.
                if e.is_timeout() || e.is_connect() {
                    Error::EmbeddingTimeout(self.timeout)
                } else {
                    Error::Embedding(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String], kind: ModelKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model(kind);

        let mut attempt = 0;
        loop {
            match self.request(model, texts).await {
                Ok(vectors) => {
                    debug!(model, batch = texts.len(), "embedding batch complete");
                    return Ok(vectors);
                }
                Err(e) if e.is_recoverable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                    warn!(
                        model,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_id(&self, kind: ModelKind) -> String {
        self.model(kind).to_string()
    }

    async fn healthy(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(
            self.client.get(&url).send().await,
            Ok(response) if response.status().is_success()
        )
    }
}
