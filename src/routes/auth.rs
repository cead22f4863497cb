// ABOUTME: Account routes: register, login, current user, logout and profile update
// ABOUTME: Thin handlers delegating to the session-token auth manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use crate::{
    auth::{AuthSession, ProfileChange},
    errors::AppError,
    models::UserRecord,
    routes::extract::JsonBody,
    server::ServerResources,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /auth/register`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Login email
    pub email: String,
    /// Plain password
    pub password: String,
    /// Optional display name
    pub display_name: Option<String>,
}

/// Body of `POST /auth/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Plain password
    pub password: String,
}

/// Response of `GET /auth/me` and `PUT /auth/profile`
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// The account
    pub user: UserRecord,
}

/// Authentication routes
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all authentication routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/auth/register", post(Self::handle_register))
            .route("/auth/login", post(Self::handle_login))
            .route("/auth/me", get(Self::handle_me))
            .route("/auth/logout", post(Self::handle_logout))
            .route("/auth/profile", put(Self::handle_update_profile))
            .with_state(resources)
    }

    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        JsonBody(request): JsonBody<RegisterRequest>,
    ) -> Result<Response, AppError> {
        let session = resources
            .auth
            .register(
                &request.email,
                &request.password,
                request.display_name.as_deref(),
            )
            .await?;
        Ok((StatusCode::CREATED, Json(session)).into_response())
    }

    async fn handle_login(
        State(resources): State<Arc<ServerResources>>,
        JsonBody(request): JsonBody<LoginRequest>,
    ) -> Result<Json<AuthSession>, AppError> {
        Ok(Json(
            resources
                .auth
                .login(&request.email, &request.password)
                .await?,
        ))
    }

    async fn handle_me(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Json<UserResponse>, AppError> {
        let caller = resources.auth.require_user(&headers).await?;
        let user = resources.auth.current_user(&caller).await?;
        Ok(Json(UserResponse { user }))
    }

    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<StatusCode, AppError> {
        let caller = resources.auth.require_user(&headers).await?;
        resources.auth.logout(&caller).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn handle_update_profile(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        JsonBody(change): JsonBody<ProfileChange>,
    ) -> Result<Json<UserResponse>, AppError> {
        let caller = resources.auth.require_user(&headers).await?;
        let user = resources.auth.update_profile(&caller, change).await?;
        Ok(Json(UserResponse { user }))
    }
}
