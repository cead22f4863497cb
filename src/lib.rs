// ABOUTME: Library entry point for the Threadline conversation server
// ABOUTME: Streaming chat turns, one-shot auto titles and expiring share links over HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

#![deny(unsafe_code)]

//! # Threadline
//!
//! A chat backend that stores conversations in SQLite, streams model replies
//! to clients as Server-Sent Events, titles each new conversation once in the
//! background and lets owners publish read-only snapshots behind expiring
//! share links.
//!
//! ## Architecture
//!
//! - **database**: [`database::ChatStore`], the single source of truth
//! - **llm**: the generation service seam and its OpenAI-compatible client
//! - **pipeline**: one user turn as a typed event stream
//! - **titles**: background title generation guarded by a persisted flag
//! - **sharing**: share link lifecycle with lazy expiry
//! - **auth**: bearer session tokens
//! - **routes** / **server**: the axum HTTP surface
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use threadline::config::ServerConfig;
//! use threadline::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     Server::new(config).run().await
//! }
//! ```

/// Email/password accounts and bearer session tokens
pub mod auth;
/// Environment-driven configuration
pub mod config;
/// Defaults and limits
pub mod constants;
/// SQLite persistence
pub mod database;
/// Error taxonomy shared with the core crate
pub mod errors;
/// Generation service abstraction and client
pub mod llm;
/// Structured logging setup
pub mod logging;
/// HTTP middleware
pub mod middleware;
/// Persisted record types
pub mod models;
/// Streaming turn pipeline
pub mod pipeline;
/// HTTP route handlers
pub mod routes;
/// Server assembly
pub mod server;
/// Share link lifecycle
pub mod sharing;
/// Background title generation
pub mod titles;
