//! Completion service abstraction and the OpenAI-compatible implementation.
//!
//! One method, one seam: the classifier and answer composer depend on
//! [`CompletionService`] and tests inject scripted stubs. The shipped
//! implementation calls an OpenAI-compatible `/chat/completions` endpoint
//! with the same retry ladder as the embedding client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Role};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Ordered chat messages in, completion text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat-completion client for OpenAI-compatible APIs.
pub struct OpenAiCompletions {
    config: CompletionConfig,
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiCompletions {
    /// Create a client from configuration. Requires `OPENAI_API_KEY`.
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", API_KEY_ENV)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Completion(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletions {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let wire_messages: Vec<WireMessage<'_>> = messages
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: &m.text,
            })
            .collect();

        let body = CompletionRequest {
            model: &self.config.model,
            messages: &wire_messages,
            temperature: self.config.temperature,
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
                        let parsed: CompletionResponse = response.json().await.map_err(|e| {
                            Error::Completion(format!("invalid completion response: {}", e))
                        })?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| {
                                Error::Completion("completion response had no choices".to_string())
                            });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::Completion(format!(
                            "completions API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(Error::Completion(format!(
                        "completions API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err =
                        Some(Error::Completion(format!("completion request failed: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Completion("completion failed after retries".to_string())))
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage<'a>],
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}
