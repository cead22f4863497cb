// ABOUTME: Conversation CRUD routes and the streaming message endpoint
// ABOUTME: Streams turn events as Server-Sent Events with keep-alive comments
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! Conversation routes
//!
//! Bearer authentication is optional here. An authenticated caller owns the
//! conversations it creates and only lists its own; anonymous callers see
//! anonymous conversations. A conversation with an owner answers 404 to
//! everyone else, so share links stay the only way for others to read it.

use crate::{
    constants::limits,
    database::{ConversationPatch, NewConversation},
    errors::AppError,
    models::{ConversationRecord, ConversationSummary, MessageRecord},
    pipeline::ChatEvent,
    routes::extract::JsonBody,
    server::ServerResources,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

/// Body of `POST /conversations`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// Explicit title; the conversation is then never auto-titled
    pub title: Option<String>,
    /// Model, server default when absent
    pub model: Option<String>,
    /// Optional grouping key
    pub project_id: Option<String>,
}

/// Body of `PUT /conversations/:id`
#[derive(Debug, Default, Deserialize)]
pub struct UpdateConversationRequest {
    /// New title
    pub title: Option<String>,
    /// New model
    pub model: Option<String>,
}

/// Body of `POST /conversations/:id/messages/stream`
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message text
    #[serde(default)]
    pub content: String,
}

/// Query of `GET /conversations`
#[derive(Debug, Default, Deserialize)]
pub struct ListConversationsQuery {
    /// Page size
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
}

/// Response of `GET /conversations`
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    /// One page of summaries, most recently updated first
    pub conversations: Vec<ConversationSummary>,
    /// Total visible to the caller
    pub total: i64,
}

/// Response of `GET /conversations/:id/messages`
#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    /// Messages in order
    pub messages: Vec<MessageRecord>,
}

/// Conversation routes
pub struct ConversationRoutes;

impl ConversationRoutes {
    /// Create all conversation routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/conversations",
                post(Self::handle_create).get(Self::handle_list),
            )
            .route(
                "/conversations/:id",
                get(Self::handle_get)
                    .put(Self::handle_update)
                    .delete(Self::handle_delete),
            )
            .route("/conversations/:id/messages", get(Self::handle_list_messages))
            .route(
                "/conversations/:id/messages/stream",
                post(Self::handle_stream_message),
            )
            .with_state(resources)
    }

    async fn caller_id(
        headers: &HeaderMap,
        resources: &ServerResources,
    ) -> Result<Option<String>, AppError> {
        Ok(resources
            .auth
            .authenticate_headers(headers)
            .await?
            .map(|user| user.user_id))
    }

    /// Load a conversation the caller may act on
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when the conversation does not exist or
    /// belongs to another user, and an auth error for a bad bearer token
    pub(crate) async fn owned_conversation(
        headers: &HeaderMap,
        resources: &ServerResources,
        conversation_id: &str,
    ) -> Result<ConversationRecord, AppError> {
        let caller = Self::caller_id(headers, resources).await?;
        let conversation = resources
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        match conversation.user_id {
            Some(ref owner) if caller.as_deref() != Some(owner.as_str()) => {
                debug!(conversation_id, "Conversation hidden from non-owner");
                Err(AppError::not_found("Conversation"))
            }
            _ => Ok(conversation),
        }
    }

    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        JsonBody(request): JsonBody<CreateConversationRequest>,
    ) -> Result<Response, AppError> {
        let user_id = Self::caller_id(&headers, &resources).await?;

        let title = match request.title {
            Some(title) => Some(validate_title(&title)?),
            None => None,
        };
        let model = request
            .model
            .map(|model| model.trim().to_owned())
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| resources.config.default_model.clone());

        let conversation = resources
            .store
            .create_conversation(NewConversation {
                title,
                model,
                project_id: request.project_id,
                user_id,
            })
            .await?;

        Ok((StatusCode::CREATED, Json(conversation)).into_response())
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<ListConversationsQuery>,
    ) -> Result<Json<ConversationListResponse>, AppError> {
        let user_id = Self::caller_id(&headers, &resources).await?;
        let limit = query
            .limit
            .unwrap_or(limits::DEFAULT_LIST_LIMIT)
            .clamp(1, limits::MAX_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);

        let conversations = resources
            .store
            .list_conversations(user_id.as_deref(), limit, offset)
            .await?;
        let total = resources
            .store
            .count_conversations(user_id.as_deref())
            .await?;

        Ok(Json(ConversationListResponse {
            conversations,
            total,
        }))
    }

    async fn handle_get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<ConversationRecord>, AppError> {
        let conversation = Self::owned_conversation(&headers, &resources, &id).await?;
        Ok(Json(conversation))
    }

    async fn handle_update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
        JsonBody(request): JsonBody<UpdateConversationRequest>,
    ) -> Result<Json<ConversationRecord>, AppError> {
        Self::owned_conversation(&headers, &resources, &id).await?;

        let title = match request.title {
            Some(title) => Some(validate_title(&title)?),
            None => None,
        };
        let model = request
            .model
            .map(|model| model.trim().to_owned())
            .filter(|model| !model.is_empty());
        if title.is_none() && model.is_none() {
            return Err(AppError::invalid_input(
                "Provide a title or a model to update",
            ));
        }

        let conversation = resources
            .store
            .update_conversation(&id, ConversationPatch { title, model })
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        Ok(Json(conversation))
    }

    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<StatusCode, AppError> {
        Self::owned_conversation(&headers, &resources, &id).await?;
        if !resources.store.delete_conversation(&id).await? {
            return Err(AppError::not_found("Conversation"));
        }
        Ok(StatusCode::NO_CONTENT)
    }

    async fn handle_list_messages(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<MessageListResponse>, AppError> {
        Self::owned_conversation(&headers, &resources, &id).await?;
        let messages = resources.store.list_messages(&id).await?;
        Ok(Json(MessageListResponse { messages }))
    }

    /// Run one turn and relay its events as SSE
    async fn handle_stream_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
        JsonBody(request): JsonBody<SendMessageRequest>,
    ) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>, AppError> {
        Self::owned_conversation(&headers, &resources, &id).await?;

        let turn = resources.pipeline.start_turn(&id, &request.content).await?;
        let events = turn.map(|event| Ok::<_, Infallible>(sse_event(&event)));

        Ok(Sse::new(events).keep_alive(KeepAlive::default()))
    }
}

fn sse_event(event: &ChatEvent) -> Event {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(data) => Event::default().event(event_type).data(data),
        Err(e) => {
            error!(event_type, error = %e, "Failed to serialize chat event");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","code":"SERIALIZATION_ERROR","error":"Failed to encode event"}"#)
        }
    }
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::invalid_input("Title must not be empty"));
    }
    if title.chars().count() > limits::MAX_USER_TITLE_CHARS {
        return Err(AppError::invalid_input(format!(
            "Title exceeds {} characters",
            limits::MAX_USER_TITLE_CHARS
        )));
    }
    Ok(title.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_CONVERSATION_TITLE;

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Trip plans ").unwrap(), "Trip plans");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(limits::MAX_USER_TITLE_CHARS + 1)).is_err());
        assert_eq!(validate_title(DEFAULT_CONVERSATION_TITLE).unwrap(), DEFAULT_CONVERSATION_TITLE);
    }
}
