// ABOUTME: Unified error handling re-exported from the core crate
// ABOUTME: One taxonomy for the store, the pipeline and the HTTP layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Error Handling
//!
//! [`AppError`] and [`ErrorCode`] live in `threadline-core` so that the
//! record types and the server share one taxonomy. Handlers return
//! `Result<_, AppError>`; the `http-response` feature renders errors as
//! `{ "error": <message>, "code": <CODE> }` with the code's status.

pub use threadline_core::errors::*;

