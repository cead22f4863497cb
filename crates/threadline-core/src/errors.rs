// ABOUTME: Unified error type with stable error codes and HTTP status mapping
// ABOUTME: Shared by the store, the streaming pipeline and every HTTP handler
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Unified Error Handling
//!
//! Every fallible operation in the server returns [`AppResult`]. An
//! [`AppError`] carries an [`ErrorCode`] that decides the HTTP status and the
//! stable machine-readable code, plus a human-readable message. With the
//! `http-response` feature the error renders itself as
//! `{ "error": <message>, "code": <CODE> }`.
//!
//! Internal failures (database, configuration, unexpected states) are logged
//! with full detail when rendered, while clients only see the generic
//! description of the code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication
    /// No credentials were presented
    AuthRequired,
    /// Credentials were presented but are not valid (bad token, logged out)
    AuthInvalid,
    /// Credentials were valid once but have expired
    AuthExpired,

    // Validation
    /// The request body or parameters are invalid
    InvalidInput,
    /// A required field is missing or empty
    MissingRequiredField,

    // Resources
    /// The resource never existed or was deleted
    ResourceNotFound,
    /// The resource existed but is no longer available (expired)
    ResourceGone,
    /// A resource with this identifier already exists
    ResourceAlreadyExists,

    // External collaborators
    /// The generation collaborator failed or timed out
    UpstreamGenerationError,

    // Internal
    /// Configuration is missing or invalid
    ConfigError,
    /// An unexpected internal failure
    InternalError,
    /// The persistent store failed
    DatabaseError,
    /// Data could not be serialized or deserialized
    SerializationError,
}

impl ErrorCode {
    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::MissingRequiredField => 400,
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => 401,
            Self::ResourceNotFound => 404,
            Self::ResourceAlreadyExists => 409,
            Self::ResourceGone => 410,
            Self::UpstreamGenerationError => 502,
            Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError => 500,
        }
    }

    /// Stable wire name of the code (matches the serde representation)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::ResourceGone => "RESOURCE_GONE",
            Self::ResourceAlreadyExists => "RESOURCE_ALREADY_EXISTS",
            Self::UpstreamGenerationError => "UPSTREAM_GENERATION_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SerializationError => "SERIALIZATION_ERROR",
        }
    }

    /// User-facing description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceGone => "The requested resource is no longer available",
            Self::ResourceAlreadyExists => "A resource with this identifier already exists",
            Self::UpstreamGenerationError => "The generation service failed to respond",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether the message must be hidden from clients
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(
            self,
            Self::ConfigError | Self::InternalError | Self::DatabaseError | Self::SerializationError
        )
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
#[error("{}: {}", .code.description(), .message)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Authentication expired
    #[must_use]
    pub fn auth_expired() -> Self {
        Self::new(ErrorCode::AuthExpired, "Authentication token has expired")
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required field missing or empty
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Field '{field}' is required and must not be empty"),
        )
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Resource existed but has expired
    pub fn gone(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceGone,
            format!("{} has expired", resource.into()),
        )
    }

    /// Resource already exists
    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceAlreadyExists,
            format!("{} already exists", resource.into()),
        )
    }

    /// Generation collaborator failure
    pub fn upstream_generation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamGenerationError, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Message safe to show to a client
    #[must_use]
    pub fn client_message(&self) -> String {
        if self.code.is_internal() {
            self.code.description().to_owned()
        } else {
            self.message.clone()
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

/// HTTP error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable human-readable message
    pub error: String,
    /// Machine-readable code
    pub code: ErrorCode,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: error.client_message(),
            code: error.code,
        }
    }
}

#[cfg(feature = "http-response")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if self.code.is_internal() {
            tracing::error!(code = self.code.as_str(), error = %self.message, "request failed");
        } else {
            tracing::debug!(code = self.code.as_str(), error = %self.message, "request rejected");
        }

        let status = http::StatusCode::from_u16(self.http_status())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::InvalidInput.http_status(), 400);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ResourceGone.http_status(), 410);
        assert_eq!(ErrorCode::UpstreamGenerationError.http_status(), 502);
        assert_eq!(ErrorCode::DatabaseError.http_status(), 500);
    }

    #[test]
    fn test_error_code_wire_name_matches_serde() {
        for code in [
            ErrorCode::ResourceGone,
            ErrorCode::UpstreamGenerationError,
            ErrorCode::AuthInvalid,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_owned()));
        }
    }

    #[test]
    fn test_gone_and_not_found_are_distinct() {
        let gone = AppError::gone("Share link");
        let missing = AppError::not_found("Share link");
        assert_ne!(gone.http_status(), missing.http_status());
        assert_eq!(gone.message, "Share link has expired");
    }

    #[test]
    fn test_internal_messages_are_hidden() {
        let error = AppError::database("UNIQUE constraint failed: users.email");
        let body = ErrorResponse::from(&error);
        assert_eq!(body.error, ErrorCode::DatabaseError.description());
        assert!(!body.error.contains("UNIQUE"));

        let error = AppError::invalid_input("content must not be empty");
        assert_eq!(ErrorResponse::from(&error).error, "content must not be empty");
    }
}
