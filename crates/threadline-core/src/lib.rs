// ABOUTME: Core types for the Threadline conversation server
// ABOUTME: Foundation crate with the error taxonomy and persisted record types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

#![deny(unsafe_code)]

//! # Threadline Core
//!
//! Shared types for the Threadline server. This crate changes rarely, which
//! keeps incremental builds of the server crate fast.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode` and the HTTP error body
//! - **models**: conversation, message, share-link and user records

/// Unified error handling with stable error codes and HTTP responses
pub mod errors;

/// Persisted record types
pub mod models;
