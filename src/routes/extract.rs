// ABOUTME: Request extractors shared by the route modules
// ABOUTME: JSON bodies that reject with the API error envelope and treat an empty body as `{}`
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use crate::errors::AppError;
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// JSON request body
///
/// An empty body deserializes as `{}`, so request types whose fields are
/// all optional accept bodyless requests. A non-JSON content type or a body
/// that does not match `T` is `InvalidInput`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().map(str::to_owned));
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::invalid_input(rejection.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_slice(b"{}")
                .map(Self)
                .map_err(|e| AppError::invalid_input(format!("Request body is required: {e}")));
        }

        match content_type {
            Some(Ok(ref value)) if is_json_content_type(value) => {}
            None => {}
            Some(_) => {
                return Err(AppError::invalid_input(
                    "Expected request with Content-Type: application/json",
                ))
            }
        }

        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|e| AppError::invalid_input(format!("Invalid JSON body: {e}")))
    }
}

fn is_json_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(is_json_content_type("application/merge-patch+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/x-www-form-urlencoded"));
    }
}
