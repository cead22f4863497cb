// ABOUTME: Integration tests for share link routes
// ABOUTME: Tests creation, public resolution, re-sharing, revocation and the expired vs unknown split
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use axum::http::StatusCode;
use common::{TestApp, TEST_PUBLIC_BASE_URL};
use helpers::axum_test::AxumTestRequest;
use serde_json::{json, Value};
use std::time::Duration;
use threadline::{models::MessageRole, sharing::ShareReaper};

async fn conversation_with_messages(app: &TestApp) -> String {
    let response = AxumTestRequest::post("/conversations")
        .json(&json!({ "title": "Shared chat" }))
        .send(app.router())
        .await;
    let body: Value = response.json();
    let id = body["id"].as_str().unwrap().to_owned();

    app.store()
        .append_message(&id, MessageRole::User, "Hi", None)
        .await
        .unwrap();
    app.store()
        .append_message(&id, MessageRole::Assistant, "Hello there.", Some(3))
        .await
        .unwrap();
    id
}

async fn create_share(app: &TestApp, id: &str, body: Value) -> Value {
    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .json(&body)
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

async fn resolve(app: &TestApp, token: &str) -> (StatusCode, Value) {
    let response = AxumTestRequest::get(&format!("/shared/{token}"))
        .send(app.router())
        .await;
    (response.status_code(), response.json())
}

// ============================================================================
// Create and Resolve
// ============================================================================

#[tokio::test]
async fn test_create_and_resolve_share() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;

    let link = create_share(&app, &id, json!({})).await;
    let token = link["shareToken"].as_str().unwrap();
    assert_eq!(
        link["url"].as_str().unwrap(),
        format!("{TEST_PUBLIC_BASE_URL}/shared/{token}")
    );
    assert!(link["expiresAt"].is_null());

    let (status, snapshot) = resolve(&app, token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["conversation"]["id"], id.as_str());
    assert_eq!(snapshot["conversation"]["title"], "Shared chat");
    assert!(snapshot["conversation"]["userId"].is_null());
    let messages = snapshot["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], "Hello there.");
    assert_eq!(snapshot["share"]["viewCount"], 1);

    let (_, again) = resolve(&app, token).await;
    assert_eq!(again["share"]["viewCount"], 2);

    let status: Value = AxumTestRequest::get(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await
        .json();
    assert_eq!(status["shared"], true);
    assert_eq!(status["expired"], false);
    assert_eq!(status["viewCount"], 2);
}

#[tokio::test]
async fn test_create_share_without_body() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;

    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let link: Value = response.json();
    assert!(link["shareToken"].is_string());
}

#[tokio::test]
async fn test_create_share_validation() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;

    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .json(&json!({ "expiresAt": "next tuesday" }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = AxumTestRequest::post("/conversations/missing/share")
        .json(&json!({}))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_share_body_never_creates_a_link() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let epoch_millis = chrono::Utc::now().timestamp_millis() - 1000;

    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .json(&json!({ "expiresAt": epoch_millis }))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body["error"].is_string());

    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .raw_body("application/json", "{\"expiresAt\": ")
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = AxumTestRequest::post(&format!("/conversations/{id}/share"))
        .raw_body("text/plain", "expiresAt=2001-02-03T04:05:06Z")
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    assert!(app
        .store()
        .get_share_for_conversation(&id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = resolve(&app, "never-issued").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RESOURCE_NOT_FOUND");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_resharing_replaces_token() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;

    let first = create_share(&app, &id, json!({})).await;
    let second = create_share(&app, &id, json!({})).await;
    let old = first["shareToken"].as_str().unwrap();
    let new = second["shareToken"].as_str().unwrap();
    assert_ne!(old, new);

    let (status, _) = resolve(&app, old).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = resolve(&app, new).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["share"]["viewCount"], 1);
}

#[tokio::test]
async fn test_revoke_share() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let link = create_share(&app, &id, json!({})).await;
    let token = link["shareToken"].as_str().unwrap();

    let response = AxumTestRequest::delete(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["message"], "Share link revoked");

    let (status, _) = resolve(&app, token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = AxumTestRequest::delete(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let status: Value = AxumTestRequest::get(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await
        .json();
    assert_eq!(status["shared"], false);
    assert!(status.get("shareToken").is_none());
}

#[tokio::test]
async fn test_deleting_conversation_kills_share() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let link = create_share(&app, &id, json!({})).await;

    AxumTestRequest::delete(&format!("/conversations/{id}"))
        .send(app.router())
        .await;

    let (status, _) = resolve(&app, link["shareToken"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = AxumTestRequest::get(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_expired_share_is_gone_not_missing() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let link = create_share(&app, &id, json!({ "expiresAt": "2001-02-03T04:05:06Z" })).await;
    let token = link["shareToken"].as_str().unwrap();
    assert!(link["expiresAt"].as_str().unwrap().starts_with("2001-02-03T04:05:06"));

    let (status, body) = resolve(&app, token).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "RESOURCE_GONE");

    let status: Value = AxumTestRequest::get(&format!("/conversations/{id}/share"))
        .send(app.router())
        .await
        .json();
    assert_eq!(status["shared"], false);
    assert_eq!(status["expired"], true);

    let row = app.store().get_share_by_token(token).await.unwrap().unwrap();
    assert_eq!(row.view_count, 0);
}

#[tokio::test]
async fn test_future_expiry_resolves() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let expires = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let link = create_share(&app, &id, json!({ "expiresAt": expires })).await;

    let (status, body) = resolve(&app, link["shareToken"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["share"]["expiresAt"].is_string());
}

#[tokio::test]
async fn test_reaper_turns_gone_into_not_found() {
    let app = TestApp::new().await;
    let id = conversation_with_messages(&app).await;
    let link = create_share(&app, &id, json!({ "expiresAt": "2001-02-03T04:05:06Z" })).await;
    let token = link["shareToken"].as_str().unwrap();

    let reaper = ShareReaper::new(
        app.store().clone(),
        Duration::from_secs(60),
        Duration::ZERO,
    );
    assert_eq!(reaper.reap_once().await.unwrap(), 1);
    assert_eq!(reaper.reap_once().await.unwrap(), 0);

    let (status, _) = resolve(&app, token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The conversation itself is untouched
    let response = AxumTestRequest::get(&format!("/conversations/{id}"))
        .send(app.router())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
