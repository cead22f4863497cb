// ABOUTME: Server assembly: shared resources, router construction and the serve loop
// ABOUTME: Wires store, generation client, pipeline, share manager and auth into axum
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Server
//!
//! [`ServerResources`] is created once at startup and shared by every
//! handler through `Arc`. [`build_router`] is also what the integration
//! tests drive, so the production router and the tested router are the same.

use crate::{
    auth::AuthManager,
    config::ServerConfig,
    database::ChatStore,
    errors::AppResult,
    llm::{LlmProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider},
    middleware::setup_cors,
    pipeline::TurnPipeline,
    routes::{AuthRoutes, ConversationRoutes, HealthRoutes, ShareRoutes},
    sharing::{ShareManager, ShareReaper},
    titles::TitleGenerator,
};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Everything a request handler may need
#[derive(Clone)]
pub struct ServerResources {
    /// Conversation store
    pub store: ChatStore,
    /// Turn pipeline
    pub pipeline: TurnPipeline,
    /// Share link manager
    pub shares: ShareManager,
    /// Account and session manager
    pub auth: AuthManager,
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Assemble resources around an opened store and a generation provider
    ///
    /// # Errors
    ///
    /// Returns an error if the auth secret cannot be prepared
    pub fn new(
        config: ServerConfig,
        store: ChatStore,
        llm: Arc<dyn LlmProvider>,
    ) -> AppResult<Self> {
        let titles = TitleGenerator::new(store.clone(), llm.clone(), config.titles.timeout());
        let pipeline = TurnPipeline::new(
            store.clone(),
            llm,
            titles,
            config.llm.system_prompt.clone(),
        );
        let shares = ShareManager::new(store.clone(), config.sharing.public_base_url.clone());
        let auth = AuthManager::from_config(store.clone(), &config.auth)?;

        Ok(Self {
            store,
            pipeline,
            shares,
            auth,
            config: Arc::new(config),
        })
    }
}

/// Build the complete HTTP router
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    let cors = setup_cors(&resources.config.cors);
    Router::new()
        .merge(HealthRoutes::routes(resources.clone()))
        .merge(ConversationRoutes::routes(resources.clone()))
        .merge(ShareRoutes::routes(resources.clone()))
        .merge(AuthRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// The Threadline HTTP server
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a server from configuration
    #[must_use]
    pub const fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Open the database, wire resources and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the database, the generation client or the
    /// listening socket cannot be set up
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config;
        let port = config.http_port;

        let store = ChatStore::connect(&config.database.url)
            .await
            .context("Failed to open database")?;

        let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::from(&config.llm))
            .context("Failed to create generation client")?;
        info!(
            provider = provider.name(),
            model = provider.default_model(),
            "Generation client ready"
        );
        if let Err(e) = provider.health_check().await {
            warn!(error = %e, "Generation service not reachable at startup; turns will fail until it is");
        }

        let reaper = (config.sharing.reap_interval_secs > 0).then(|| {
            info!(
                interval_secs = config.sharing.reap_interval_secs,
                grace_secs = config.sharing.reap_grace_secs,
                "Share reaper enabled"
            );
            ShareReaper::new(
                store.clone(),
                Duration::from_secs(config.sharing.reap_interval_secs),
                Duration::from_secs(config.sharing.reap_grace_secs),
            )
            .spawn()
        });

        let resources = Arc::new(ServerResources::new(config, store, Arc::new(provider))?);
        let router = build_router(resources);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "HTTP server listening");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        served.context("HTTP server failed")?;
        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received; draining connections");
}
