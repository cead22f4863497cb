// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds in-memory stores, server resources and a router around the scripted double
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors
#![allow(
    dead_code,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `threadline`

use crate::helpers::scripted_llm::ScriptedLlm;
use axum::Router;
use std::sync::{Arc, Once};
use std::time::Duration;
use threadline::{
    config::{DatabaseUrl, ServerConfig},
    database::ChatStore,
    pipeline::TurnPipeline,
    server::{build_router, ServerResources},
    titles::TitleGenerator,
};

static INIT_LOGGER: Once = Once::new();

/// Public base used in share URLs built during tests
pub const TEST_PUBLIC_BASE_URL: &str = "http://threadline.test";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Configuration with an in-memory database and a fixed secret
pub fn test_config() -> ServerConfig {
    ServerConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("sqlite::memory:".to_owned()),
        "JWT_SECRET" => Some("integration-test-secret-0123456789abcdef".to_owned()),
        "PUBLIC_BASE_URL" => Some(TEST_PUBLIC_BASE_URL.to_owned()),
        "DEFAULT_MODEL" => Some("test-model".to_owned()),
        "TITLE_TIMEOUT_SECS" => Some("2".to_owned()),
        _ => None,
    })
    .unwrap()
}

/// Fresh migrated in-memory store
pub async fn create_test_store() -> ChatStore {
    init_test_logging();
    ChatStore::connect(&DatabaseUrl::Memory).await.unwrap()
}

/// A router over fresh resources plus handles for assertions
pub struct TestApp {
    pub resources: Arc<ServerResources>,
    pub llm: ScriptedLlm,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let store = create_test_store().await;
        let llm = ScriptedLlm::new();
        let mut resources = ServerResources::new(config, store, Arc::new(llm.clone())).unwrap();
        resources.auth = resources.auth.clone().with_bcrypt_cost(4);
        Self {
            resources: Arc::new(resources),
            llm,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.resources.clone())
    }

    pub fn store(&self) -> &ChatStore {
        &self.resources.store
    }
}

/// Pipeline over `store` with a short title timeout
pub fn create_test_pipeline(store: &ChatStore, llm: &ScriptedLlm) -> TurnPipeline {
    let llm: Arc<ScriptedLlm> = Arc::new(llm.clone());
    let titles = TitleGenerator::new(store.clone(), llm.clone(), Duration::from_millis(500));
    TurnPipeline::new(store.clone(), llm, titles, None)
}
