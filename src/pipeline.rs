// ABOUTME: Streaming message pipeline executing one user turn as a typed event stream
// ABOUTME: Persists the user message, relays generation deltas, commits the reply, and emits titles
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Turn Pipeline
//!
//! [`TurnPipeline::start_turn`] runs the synchronous part of a turn
//! (validation, conversation lookup, storing the user message) and returns
//! the rest as a stream of [`ChatEvent`]s:
//!
//! ```text
//! user_message_saved, content_delta*, assistant_message_saved, title_updated?
//! user_message_saved, content_delta*, error
//! ```
//!
//! The assistant message is committed all-or-nothing: any generation failure
//! ends the stream with an `error` event and stores nothing. Dropping the
//! stream (client disconnect) drops the upstream generation stream with it,
//! which aborts the outbound request; nothing is stored for that turn either.

use crate::constants::limits;
use crate::database::ChatStore;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::models::{ConversationRecord, MessageRecord, MessageRole, TitleState};
use crate::titles::TitleGenerator;
use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One event of a turn stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The user message has been stored
    UserMessageSaved {
        /// Stored user message
        message: MessageRecord,
    },
    /// A fragment of the reply, in generation order
    ContentDelta {
        /// Text fragment
        delta: String,
    },
    /// The complete reply has been stored
    AssistantMessageSaved {
        /// Stored assistant message
        message: MessageRecord,
    },
    /// The conversation received its automatic title
    TitleUpdated {
        /// Conversation with the new title
        conversation: ConversationRecord,
    },
    /// The turn failed; nothing further follows
    Error {
        /// Stable error code
        code: ErrorCode,
        /// Human-readable reason
        error: String,
    },
}

impl ChatEvent {
    /// SSE event name, identical to the `type` tag
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::UserMessageSaved { .. } => "user_message_saved",
            Self::ContentDelta { .. } => "content_delta",
            Self::AssistantMessageSaved { .. } => "assistant_message_saved",
            Self::TitleUpdated { .. } => "title_updated",
            Self::Error { .. } => "error",
        }
    }

    fn from_error(error: &AppError) -> Self {
        Self::Error {
            code: error.code,
            error: error.client_message(),
        }
    }
}

/// Stream of events for one turn
pub type TurnStream = BoxStream<'static, ChatEvent>;

/// Executes user turns against the store and the generation service
#[derive(Clone)]
pub struct TurnPipeline {
    store: ChatStore,
    llm: Arc<dyn LlmProvider>,
    titles: TitleGenerator,
    system_prompt: Option<Arc<str>>,
}

impl TurnPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(
        store: ChatStore,
        llm: Arc<dyn LlmProvider>,
        titles: TitleGenerator,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            store,
            llm,
            titles,
            system_prompt: system_prompt.map(Arc::from),
        }
    }

    /// Validate the turn, store the user message and return the event stream
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty or oversized content,
    /// `ResourceNotFound` for an unknown conversation, and a database error
    /// if the user message cannot be stored. No stream is opened in these
    /// cases.
    pub async fn start_turn(&self, conversation_id: &str, content: &str) -> AppResult<TurnStream> {
        if content.trim().is_empty() {
            return Err(AppError::invalid_input("Message content must not be empty"));
        }
        if content.chars().count() > limits::MAX_MESSAGE_CHARS {
            return Err(AppError::invalid_input(format!(
                "Message content exceeds {} characters",
                limits::MAX_MESSAGE_CHARS
            )));
        }

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let user_message = self
            .store
            .append_message(conversation_id, MessageRole::User, content, None)
            .await?;

        let history = self.store.list_messages(conversation_id).await?;
        let prompt = self.build_prompt(&history);

        info!(
            conversation_id,
            user_message_id = %user_message.id,
            history_len = history.len(),
            "Turn started"
        );
        Ok(self.clone().run_turn(conversation, user_message, prompt).boxed())
    }

    fn build_prompt(&self, history: &[MessageRecord]) -> Vec<ChatMessage> {
        self.system_prompt
            .iter()
            .map(|prompt| ChatMessage::system(prompt.to_string()))
            .chain(
                history
                    .iter()
                    .map(|message| ChatMessage::new(message.role, message.content.clone())),
            )
            .collect()
    }

    fn run_turn(
        self,
        conversation: ConversationRecord,
        user_message: MessageRecord,
        prompt: Vec<ChatMessage>,
    ) -> impl futures_util::Stream<Item = ChatEvent> + Send + 'static {
        stream! {
            let mut progress = TurnProgress::new(&conversation.id);
            let user_content = user_message.content.clone();
            yield ChatEvent::UserMessageSaved { message: user_message };

            let request = ChatRequest::new(prompt)
                .with_model(conversation.model.clone())
                .with_streaming();

            let mut upstream = match self.llm.complete_stream(&request).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    progress.failed(&e);
                    yield ChatEvent::from_error(&e);
                    return;
                }
            };

            let mut reply = String::new();
            let mut token_count = None;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        if let Some(usage) = chunk.usage {
                            token_count = Some(i64::from(usage.completion_tokens));
                        }
                        if !chunk.delta.is_empty() {
                            reply.push_str(&chunk.delta);
                            progress.deltas += 1;
                            yield ChatEvent::ContentDelta { delta: chunk.delta };
                        }
                        if chunk.is_final {
                            break;
                        }
                    }
                    Err(e) => {
                        progress.failed(&e);
                        yield ChatEvent::from_error(&e);
                        return;
                    }
                }
            }
            drop(upstream);

            if reply.trim().is_empty() {
                let e = AppError::upstream_generation("Generation service returned an empty reply");
                progress.failed(&e);
                yield ChatEvent::from_error(&e);
                return;
            }

            let assistant = match self
                .store
                .append_message(&conversation.id, MessageRole::Assistant, &reply, token_count)
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    progress.failed(&e);
                    yield ChatEvent::from_error(&e);
                    return;
                }
            };
            progress.completed(&assistant);
            yield ChatEvent::AssistantMessageSaved { message: assistant };

            if conversation.title_state == TitleState::Pending {
                let job = self.titles.spawn(
                    conversation.id.clone(),
                    conversation.model.clone(),
                    user_content,
                    reply,
                );
                match job.await {
                    Ok(Some(conversation)) => {
                        yield ChatEvent::TitleUpdated { conversation };
                    }
                    Ok(None) => {}
                    Err(e) => warn!(conversation_id = %conversation.id, error = %e, "Title job panicked"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Streaming,
    Completed,
    Failed,
}

/// Tracks a turn so that an abandoned stream is logged when dropped
struct TurnProgress {
    conversation_id: String,
    started: Instant,
    deltas: usize,
    state: TurnState,
}

impl TurnProgress {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_owned(),
            started: Instant::now(),
            deltas: 0,
            state: TurnState::Streaming,
        }
    }

    fn failed(&mut self, error: &AppError) {
        self.state = TurnState::Failed;
        warn!(
            conversation_id = %self.conversation_id,
            code = error.code.as_str(),
            error = %error.message,
            deltas = self.deltas,
            "Turn failed; assistant reply discarded"
        );
    }

    fn completed(&mut self, assistant: &MessageRecord) {
        self.state = TurnState::Completed;
        info!(
            conversation_id = %self.conversation_id,
            assistant_message_id = %assistant.id,
            deltas = self.deltas,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Turn completed"
        );
    }
}

impl Drop for TurnProgress {
    fn drop(&mut self) {
        if self.state == TurnState::Streaming {
            info!(
                conversation_id = %self.conversation_id,
                deltas = self.deltas,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Turn aborted by client; generation cancelled"
            );
        } else {
            debug!(conversation_id = %self.conversation_id, state = ?self.state, "Turn stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let events = [
            ChatEvent::ContentDelta { delta: "x".into() },
            ChatEvent::Error {
                code: ErrorCode::UpstreamGenerationError,
                error: "boom".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn test_error_event_hides_internal_details() {
        let event = ChatEvent::from_error(&AppError::database("disk I/O error at page 7"));
        match event {
            ChatEvent::Error { code, error } => {
                assert_eq!(code, ErrorCode::DatabaseError);
                assert!(!error.contains("page 7"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
