// ABOUTME: HTTP middleware layers applied to the router
// ABOUTME: Currently cross-origin configuration; request tracing comes from tower-http
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

pub mod cors;

pub use cors::setup_cors;
