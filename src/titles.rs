// ABOUTME: One-shot background title generation for new conversations
// ABOUTME: Claims the title, asks the generation service, and applies the result if still owned
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Title Generator
//!
//! After the first completed exchange of a conversation the turn pipeline
//! dispatches a title job. The job:
//!
//! 1. claims the automatic title (fails if another job claimed it, or a user
//!    already set a title),
//! 2. asks the generation service for a short title, bounded by a timeout,
//! 3. writes the sanitised result only if the claim still stands.
//!
//! Failures are logged and swallowed: the conversation keeps its current
//! title and the claim is not released, so no conversation is titled twice.

use crate::constants::limits;
use crate::database::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::models::ConversationRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TITLE_INSTRUCTION: &str = "You write titles for chat conversations. \
Reply with a short descriptive title of at most six words for the conversation below. \
Reply with the title only: no quotes, no trailing punctuation, no explanation.";

/// Background title generation
#[derive(Clone)]
pub struct TitleGenerator {
    store: ChatStore,
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl TitleGenerator {
    /// Create a generator writing into `store`
    #[must_use]
    pub fn new(store: ChatStore, llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            store,
            llm,
            timeout,
        }
    }

    /// Ask the generation service for a title
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or the reply holds no usable title
    pub async fn generate(
        &self,
        conversation_id: &str,
        model: Option<&str>,
        first_user_message: &str,
        first_assistant_message: &str,
    ) -> AppResult<String> {
        let excerpt = format!(
            "User: {}\n\nAssistant: {}",
            truncate_chars(first_user_message, limits::TITLE_CONTEXT_CHARS),
            truncate_chars(first_assistant_message, limits::TITLE_CONTEXT_CHARS),
        );
        let mut request = ChatRequest::new(vec![
            ChatMessage::system(TITLE_INSTRUCTION),
            ChatMessage::user(excerpt),
        ])
        .with_temperature(0.3)
        .with_max_tokens(32);
        if let Some(model) = model {
            request = request.with_model(model);
        }

        let response = self.llm.complete(&request).await?;
        debug!(conversation_id, raw = %response.content, "Title candidate received");
        sanitize_title(&response.content)
            .ok_or_else(|| AppError::upstream_generation("Generation service returned a blank title"))
    }

    /// Run claim, generate and apply in a detached task
    ///
    /// The handle resolves to the updated conversation when this job wrote
    /// the title, and to `None` otherwise. Dropping the handle does not stop
    /// the job.
    #[must_use]
    pub fn spawn(
        &self,
        conversation_id: String,
        model: String,
        first_user_message: String,
        first_assistant_message: String,
    ) -> JoinHandle<Option<ConversationRecord>> {
        let generator = self.clone();
        tokio::spawn(async move {
            generator
                .run(
                    &conversation_id,
                    &model,
                    &first_user_message,
                    &first_assistant_message,
                )
                .await
        })
    }

    async fn run(
        &self,
        conversation_id: &str,
        model: &str,
        first_user_message: &str,
        first_assistant_message: &str,
    ) -> Option<ConversationRecord> {
        match self.store.claim_auto_title(conversation_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(conversation_id, "Title already claimed or user-owned");
                return None;
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Failed to claim title");
                return None;
            }
        }

        let generated = tokio::time::timeout(
            self.timeout,
            self.generate(
                conversation_id,
                Some(model),
                first_user_message,
                first_assistant_message,
            ),
        )
        .await;

        let title = match generated {
            Ok(Ok(title)) => title,
            Ok(Err(e)) => {
                warn!(conversation_id, error = %e, "Title generation failed; keeping current title");
                return None;
            }
            Err(_) => {
                warn!(
                    conversation_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Title generation timed out; keeping current title"
                );
                return None;
            }
        };

        match self.store.apply_auto_title(conversation_id, &title).await {
            Ok(Some(conversation)) => {
                info!(conversation_id, title = %conversation.title, "Conversation titled");
                Some(conversation)
            }
            Ok(None) => {
                info!(conversation_id, "Title discarded; conversation renamed or deleted meanwhile");
                None
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Failed to store generated title");
                None
            }
        }
    }
}

/// Reduce a model reply to a single clean title line
///
/// Returns `None` when nothing usable is left.
#[must_use]
pub fn sanitize_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;

    let line = strip_prefix_ignore_case(line, "title:").unwrap_or(line);
    let line = line
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '#' | '\u{201c}' | '\u{201d}'))
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | ';' | ','))
        .trim();

    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = shorten_at_word(&collapsed, limits::MAX_TITLE_CHARS);
    (!title.is_empty()).then_some(title)
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn shorten_at_word(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_owned();
    }
    let hard: String = value.chars().take(max_chars).collect();
    match hard.rfind(' ') {
        Some(cut) if cut > 0 => hard[..cut].trim_end().to_owned(),
        _ => hard,
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    value
        .char_indices()
        .nth(max_chars)
        .map_or(value, |(idx, _)| &value[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_quotes_prefix_and_punctuation() {
        assert_eq!(
            sanitize_title("\"Quantum Entanglement Explained.\"").as_deref(),
            Some("Quantum Entanglement Explained")
        );
        assert_eq!(
            sanitize_title("Title: Rust   lifetimes  primer!").as_deref(),
            Some("Rust lifetimes primer")
        );
        assert_eq!(
            sanitize_title("\n\n**Sourdough Basics**\nSome explanation").as_deref(),
            Some("Sourdough Basics")
        );
    }

    #[test]
    fn test_sanitize_rejects_blank_replies() {
        assert_eq!(sanitize_title(""), None);
        assert_eq!(sanitize_title("  \n \"\" \n"), None);
        assert_eq!(sanitize_title("..."), None);
    }

    #[test]
    fn test_sanitize_limits_length_on_word_boundary() {
        let long = "word ".repeat(30);
        let title = sanitize_title(&long).unwrap();
        assert!(title.chars().count() <= limits::MAX_TITLE_CHARS);
        assert!(title.ends_with("word"));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("h\u{e9}llo", 2), "h\u{e9}");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
