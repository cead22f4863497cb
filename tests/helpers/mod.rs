// ABOUTME: Shared test helpers for integration tests
// ABOUTME: Exports the in-process HTTP driver and the scripted generation double
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(dead_code)]

pub mod axum_test;
pub mod scripted_llm;
