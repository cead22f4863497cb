// ABOUTME: OpenAI-compatible chat completions client for local and hosted endpoints
// ABOUTME: Supports Ollama, vLLM, LocalAI and any /v1/chat/completions implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # `OpenAI`-Compatible Provider
//!
//! Talks to any endpoint implementing the `OpenAI` chat completions API.
//! Configured from [`LlmConfig`](crate::config::LlmConfig):
//!
//! - `LLM_BASE_URL`: base URL ending in `/v1` (default: a local Ollama)
//! - `LLM_MODEL`: model used when the conversation names none
//! - `LLM_API_KEY`: bearer key, optional for local servers
//!
//! Opening a request is retried on connection failures and on 429/502/503.
//! Once bytes are flowing nothing is retried, since the client may already
//! have shown part of the reply.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::sse_parser::create_sse_stream;
use super::{ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmProvider, StreamChunk, TokenUsage};
use crate::config::LlmConfig;
use crate::errors::AppError;

/// Retries after the first attempt when opening a request
const MAX_OPEN_RETRIES: u32 = 2;

/// Backoff before the first retry, doubled each time
const INITIAL_RETRY_DELAY_MS: u64 = 250;

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for OpenAiMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(u: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Configuration for the `OpenAI`-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Base URL for the API (e.g., <http://localhost:11434/v1>)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Default model to use
    pub default_model: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl From<&LlmConfig> for OpenAiCompatibleConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            default_model: config.model.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Generic `OpenAI`-compatible provider
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    fn parse_error_response(status: StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<OpenAiErrorResponse>(body).map_or_else(
            |_| body.chars().take(200).collect::<String>(),
            |parsed| parsed.error.message,
        );
        match status.as_u16() {
            401 | 403 => AppError::upstream_generation(format!(
                "Generation service rejected the credentials: {detail}"
            )),
            429 => AppError::upstream_generation("Generation service rate limit reached"),
            502..=504 => AppError::upstream_generation(
                "Generation service is not responding. Is the model server running?",
            ),
            _ => AppError::upstream_generation(format!(
                "Generation service error ({status}): {detail}"
            )),
        }
    }

    const fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 502 | 503)
    }

    /// POST to chat/completions, retrying transient failures before any byte is read
    async fn send_with_retry(&self, body: &OpenAiRequest<'_>) -> Result<reqwest::Response, AppError> {
        let mut attempt = 0;
        loop {
            let request = self.authorize(self.client.post(self.api_url("chat/completions")).json(body));
            let retry_reason = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if Self::is_retryable_status(response.status()) && attempt < MAX_OPEN_RETRIES => {
                    format!("status {}", response.status())
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::parse_error_response(status, &body));
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < MAX_OPEN_RETRIES => e.to_string(),
                Err(e) if e.is_connect() => {
                    return Err(AppError::upstream_generation(format!(
                        "Cannot connect to the generation service at {}",
                        self.config.base_url
                    ))
                    .with_source(e));
                }
                Err(e) => {
                    return Err(AppError::upstream_generation(format!(
                        "Generation request failed: {e}"
                    ))
                    .with_source(e));
                }
            };

            let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS.saturating_mul(1 << attempt));
            warn!(attempt, reason = %retry_reason, ?delay, "Retrying generation request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn parse_stream_payload(payload: &str) -> Option<Result<StreamChunk, AppError>> {
        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                // Some servers interleave non-chunk JSON such as progress notes
                debug!(error = %e, "Skipping unparseable stream payload");
                return None;
            }
        };
        let usage = chunk.usage.map(TokenUsage::from);
        match chunk.choices.into_iter().next() {
            Some(choice) => Some(Ok(StreamChunk {
                delta: choice.delta.content.unwrap_or_default(),
                is_final: false,
                finish_reason: choice.finish_reason,
                usage,
            })),
            None => usage.map(|usage| {
                Ok(StreamChunk {
                    usage: Some(usage),
                    ..StreamChunk::default()
                })
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let body = OpenAiRequest {
            model: request.model.as_deref().unwrap_or(&self.config.default_model),
            messages: request.messages.iter().map(OpenAiMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
            stream_options: None,
        };

        let response = self.send_with_retry(&body).await?;
        let parsed: OpenAiResponse = response.json().await.map_err(|e| {
            AppError::upstream_generation(format!("Failed to parse generation response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::upstream_generation("Generation service returned no choices"))?;

        debug!(chars = content.len(), "Received completion");
        Ok(ChatResponse {
            content,
            model: parsed.model,
            usage: parsed.usage.map(TokenUsage::from),
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let body = OpenAiRequest {
            model: request.model.as_deref().unwrap_or(&self.config.default_model),
            messages: request.messages.iter().map(OpenAiMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: Some(StreamOptions { include_usage: true }),
        };

        let response = self.send_with_retry(&body).await?;
        debug!("Generation stream opened");
        Ok(create_sse_stream(
            response.bytes_stream(),
            Self::parse_stream_payload,
            "openai-compatible",
        ))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        let response = self
            .authorize(self.client.get(self.api_url("models")))
            .send()
            .await
            .map_err(|e| AppError::upstream_generation(format!("Health check failed: {e}")))?;

        let healthy = response.status().is_success();
        if !healthy {
            warn!(status = %response.status(), "Generation service health check failed");
        }
        Ok(healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_payload_with_content() {
        let chunk = OpenAiCompatibleProvider::parse_stream_payload(
            r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.delta, "Hi");
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn test_stream_payload_usage_only() {
        let chunk = OpenAiCompatibleProvider::parse_stream_payload(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.usage.map(|u| u.completion_tokens), Some(5));
    }

    #[test]
    fn test_stream_payload_garbage_is_skipped() {
        assert!(OpenAiCompatibleProvider::parse_stream_payload("not json").is_none());
    }

    #[test]
    fn test_error_responses_map_to_upstream_failures() {
        let error = OpenAiCompatibleProvider::parse_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"model not found"}}"#,
        );
        assert_eq!(error.code, crate::errors::ErrorCode::UpstreamGenerationError);
        assert!(error.message.contains("model not found"));
    }
}
