// ABOUTME: Persisted record types re-exported from the core crate
// ABOUTME: Conversations, messages, share links and users as stored and serialized
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

pub use threadline_core::models::*;
