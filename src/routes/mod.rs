// ABOUTME: Route module organization for the Threadline HTTP API
// ABOUTME: Each domain module holds route definitions and thin handlers over the service layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! HTTP routes, one module per domain

/// Account and session routes
pub mod auth;
/// Conversation CRUD and streaming turn routes
pub mod conversations;
/// Shared request extractors
pub mod extract;
/// Health check and readiness routes
pub mod health;
/// Share link routes
pub mod sharing;

pub use auth::AuthRoutes;
pub use conversations::ConversationRoutes;
pub use health::HealthRoutes;
pub use sharing::ShareRoutes;
