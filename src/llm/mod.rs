// ABOUTME: Generation service abstraction used by the turn pipeline and title generator
// ABOUTME: Defines chat request/response types and the streaming provider trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Generation Provider Interface
//!
//! The server never talks to a model directly. Everything goes through
//! [`LlmProvider`], which offers a one-shot completion (used for titles) and
//! a streaming completion (used for chat turns). The production
//! implementation is [`OpenAiCompatibleProvider`]; tests plug in scripted
//! providers.
//!
//! Dropping a [`ChatStream`] must abort the underlying request. Providers
//! backed by `reqwest` get this for free since the response body is owned by
//! the stream.

mod openai_compatible;
pub mod sse_parser;

pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::errors::AppError;
pub use crate::models::MessageRole;

/// A single message sent to the generation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// Configuration for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Prompt messages in order
    pub messages: Vec<ChatMessage>,
    /// Model identifier, provider default when absent
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Whether to stream the response
    pub stream: bool,
}

impl ChatRequest {
    /// Create a new chat request with messages
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    /// Set the model to use
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable streaming
    #[must_use]
    pub const fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Response from a one-shot completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text
    pub content: String,
    /// Model that produced it
    pub model: String,
    /// Token usage when reported
    pub usage: Option<TokenUsage>,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used
    pub total_tokens: u32,
}

/// A chunk of a streaming response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta, possibly empty
    pub delta: String,
    /// Whether this is the final chunk
    pub is_final: bool,
    /// Finish reason if final
    pub finish_reason: Option<String>,
    /// Usage, usually only on the last chunk
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// A text delta
    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Self::default()
        }
    }

    /// The terminating chunk
    #[must_use]
    pub fn done(finish_reason: impl Into<String>) -> Self {
        Self {
            is_final: true,
            finish_reason: Some(finish_reason.into()),
            ..Self::default()
        }
    }
}

/// Stream type for chat completion responses
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, AppError>> + Send>>;

/// Generation service
///
/// Errors returned by implementations should use
/// `ErrorCode::UpstreamGenerationError` so they surface as 502 or as a
/// stream `error` event.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Unique provider identifier used in logs
    fn name(&self) -> &'static str;

    /// Model used when the request names none
    fn default_model(&self) -> &str;

    /// Perform a one-shot completion
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError>;

    /// Open a streaming completion
    ///
    /// Failing to open the stream is reported through the returned `Result`;
    /// failures after that arrive as `Err` items on the stream.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError>;

    /// Check whether the service is reachable
    async fn health_check(&self) -> Result<bool, AppError>;
}
