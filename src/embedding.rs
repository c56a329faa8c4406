//! Embedding service abstraction and the OpenAI-compatible implementation.
//!
//! The [`EmbeddingService`] trait is the seam the sync engine and retriever
//! depend on; tests inject in-memory stubs. The shipped implementation calls
//! an OpenAI-compatible `/embeddings` endpoint with batching, retry, and
//! exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Text to fixed-dimension vector, batched.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// The vector dimensionality of this deployment.
    fn dimension(&self) -> usize;

    /// Embed a single text (e.g. a search query).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding client for OpenAI-compatible APIs.
pub struct OpenAiEmbeddings {
    config: EmbeddingConfig,
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiEmbeddings {
    /// Create a client from configuration. Requires `OPENAI_API_KEY`.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", API_KEY_ENV)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
            dimensions: Some(self.config.dimension),
        };

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
                            Error::Embedding(format!("invalid embeddings response: {}", e))
                        })?;
                        let mut data = parsed.data;
                        data.sort_by_key(|d| d.index);
                        if data.len() != texts.len() {
                            return Err(Error::Embedding(format!(
                                "expected {} embeddings, got {}",
                                texts.len(),
                                data.len()
                            )));
                        }
                        return Ok(data.into_iter().map(|d| d.embedding).collect());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::Embedding(format!(
                            "embeddings API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(Error::Embedding(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Embedding(format!("embeddings request failed: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("embedding failed after retries".to_string())))
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddings {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            out.extend(self.call_api(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
