// ABOUTME: Share link routes for owners and the public read-only view
// ABOUTME: Maps expired links to 410 Gone and unknown or revoked links to 404
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use crate::{
    errors::AppError,
    routes::{extract::JsonBody, ConversationRoutes},
    server::ServerResources,
    sharing::{ShareLink, ShareStatus, SharedConversation},
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /conversations/:id/share`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    /// RFC 3339 expiry; the link never expires when absent
    pub expires_at: Option<String>,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// What happened
    pub message: String,
}

/// Share link routes
pub struct ShareRoutes;

impl ShareRoutes {
    /// Create all share routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/conversations/:id/share",
                post(Self::handle_create)
                    .get(Self::handle_status)
                    .delete(Self::handle_revoke),
            )
            .route("/shared/:token", get(Self::handle_resolve))
            .with_state(resources)
    }

    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
        JsonBody(request): JsonBody<CreateShareRequest>,
    ) -> Result<Json<ShareLink>, AppError> {
        ConversationRoutes::owned_conversation(&headers, &resources, &id).await?;
        let expires_at = parse_expiry(request.expires_at.as_deref())?;

        let link = resources.shares.create_share(&id, expires_at).await?;
        Ok(Json(link))
    }

    async fn handle_status(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<ShareStatus>, AppError> {
        ConversationRoutes::owned_conversation(&headers, &resources, &id).await?;
        Ok(Json(resources.shares.share_status(&id).await?))
    }

    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<MessageResponse>, AppError> {
        ConversationRoutes::owned_conversation(&headers, &resources, &id).await?;
        resources.shares.revoke_share(&id).await?;
        Ok(Json(MessageResponse {
            message: "Share link revoked".to_owned(),
        }))
    }

    /// Public, unauthenticated snapshot
    async fn handle_resolve(
        State(resources): State<Arc<ServerResources>>,
        Path(token): Path<String>,
    ) -> Result<Json<SharedConversation>, AppError> {
        Ok(Json(resources.shares.resolve_share(&token).await?))
    }
}

fn parse_expiry(value: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|_| AppError::invalid_input("expiresAt must be an RFC 3339 timestamp"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry(None).unwrap(), None);
        assert_eq!(parse_expiry(Some("  ")).unwrap(), None);
        let at = parse_expiry(Some("2030-05-01T12:00:00+02:00")).unwrap().unwrap();
        assert_eq!(at.to_rfc3339(), "2030-05-01T10:00:00+00:00");
        assert!(parse_expiry(Some("tomorrow")).is_err());
    }
}
