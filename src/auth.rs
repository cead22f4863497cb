// ABOUTME: Email/password accounts with HS256 bearer session tokens
// ABOUTME: Handles registration, login, token validation, logout and profile changes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Authentication
//!
//! Tokens are JWTs signed with a server secret. Every token carries a `jti`
//! that names a row in the `sessions` table, so logout revokes exactly one
//! token while the others of the same user stay valid.
//!
//! Authentication is optional on the conversation API: a request without an
//! `Authorization` header is anonymous, but a present header must hold a
//! valid, unexpired, unrevoked token.

use crate::config::AuthConfig;
use crate::constants::limits;
use crate::database::{format_timestamp, now_timestamp, ChatStore, ProfileUpdate};
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::models::UserRecord;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// User email
    pub email: String,
    /// Session ID
    pub jti: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// The caller behind a validated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// User ID
    pub user_id: String,
    /// User email
    pub email: String,
    /// Session backing the token
    pub session_id: String,
}

/// A freshly issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Bearer token
    pub token: String,
    /// Token expiry
    pub expires_at: String,
    /// The account
    pub user: UserRecord,
}

/// Requested profile changes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChange {
    /// New display name
    pub display_name: Option<String>,
    /// Required when changing the password
    pub current_password: Option<String>,
    /// New password
    pub new_password: Option<String>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Account and session manager
#[derive(Clone)]
pub struct AuthManager {
    store: ChatStore,
    keys: Arc<SigningKeys>,
    token_expiry_hours: i64,
    bcrypt_cost: u32,
}

impl AuthManager {
    /// Create a manager from configuration
    ///
    /// Without a configured secret a random one is generated, which
    /// invalidates every token when the process restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails
    pub fn from_config(store: ChatStore, config: &AuthConfig) -> AppResult<Self> {
        let secret = match config.jwt_secret {
            Some(ref secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("JWT_SECRET not set; using a random per-process secret, tokens will not survive restarts");
                let mut bytes = vec![0u8; 64];
                SystemRandom::new()
                    .fill(&mut bytes)
                    .map_err(|_| AppError::internal("System random source unavailable"))?;
                bytes
            }
        };
        Ok(Self::new(store, &secret, config.jwt_expiry_hours))
    }

    /// Create a manager signing with `secret`
    #[must_use]
    pub fn new(store: ChatStore, secret: &[u8], token_expiry_hours: i64) -> Self {
        Self {
            store,
            keys: Arc::new(SigningKeys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            token_expiry_hours,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor
    #[must_use]
    pub const fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Create an account and sign it in
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed email or short password and
    /// `ResourceAlreadyExists` if the email is taken
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AppResult<AuthSession> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());

        let hash = self.hash_password(password).await?;
        let user = self.store.create_user(&email, display_name, &hash).await?;
        AppLogger::log_auth_event(&user.id, "register", true, None);

        self.issue_token(user).await
    }

    /// Sign in with email and password
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` for unknown emails and wrong passwords alike
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.get_user_by_email(&email).await? else {
            debug!("Login for unknown email");
            return Err(AppError::auth_invalid("Invalid email or password"));
        };

        if !verify_password(password, &user.password_hash).await {
            AppLogger::log_auth_event(&user.id, "login", false, Some("wrong password"));
            return Err(AppError::auth_invalid("Invalid email or password"));
        }

        AppLogger::log_auth_event(&user.id, "login", true, None);
        self.issue_token(user).await
    }

    /// Issue a token backed by a new session row
    ///
    /// # Errors
    ///
    /// Returns an error if signing or storing the session fails
    pub async fn issue_token(&self, user: UserRecord) -> AppResult<AuthSession> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.token_expiry_hours);
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            jti: Uuid::now_v7().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))?;
        let expires_at = format_timestamp(expires_at);
        self.store
            .create_session(&claims.jti, &user.id, &expires_at)
            .await?;

        Ok(AuthSession {
            token,
            expires_at,
            user,
        })
    }

    /// Validate a bearer token
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` for an expired token and `AuthInvalid` for a bad
    /// signature, malformed token or revoked session
    pub async fn authenticate(&self, token: &str) -> AppResult<AuthenticatedUser> {
        let claims = self.decode_claims(token)?;
        if !self
            .store
            .is_session_active(&claims.jti, &now_timestamp())
            .await?
        {
            return Err(AppError::auth_invalid("Session has been revoked"));
        }

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            session_id: claims.jti,
        })
    }

    /// Authenticate from request headers; `None` when no header is present
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` or `AuthExpired` when a header is present but
    /// does not carry a valid token
    pub async fn authenticate_headers(
        &self,
        headers: &HeaderMap,
    ) -> AppResult<Option<AuthenticatedUser>> {
        match bearer_token(headers)? {
            Some(token) => self.authenticate(token).await.map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Self::authenticate_headers`] but a header is mandatory
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when no header is present
    pub async fn require_user(&self, headers: &HeaderMap) -> AppResult<AuthenticatedUser> {
        self.authenticate_headers(headers)
            .await?
            .ok_or_else(AppError::auth_required)
    }

    /// Revoke the session behind the caller's token
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn logout(&self, user: &AuthenticatedUser) -> AppResult<()> {
        self.store.revoke_session(&user.session_id).await?;
        AppLogger::log_auth_event(&user.user_id, "logout", true, None);
        Ok(())
    }

    /// Load the caller's account
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the account no longer exists
    pub async fn current_user(&self, user: &AuthenticatedUser) -> AppResult<UserRecord> {
        self.store
            .get_user(&user.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// Change display name and/or password
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` when the current password is wrong and
    /// `InvalidInput` when the new password is too short
    pub async fn update_profile(
        &self,
        user: &AuthenticatedUser,
        change: ProfileChange,
    ) -> AppResult<UserRecord> {
        let account = self.current_user(user).await?;

        let password_hash = match change.new_password {
            Some(ref new_password) => {
                let current = change
                    .current_password
                    .as_deref()
                    .ok_or_else(|| AppError::missing_field("currentPassword"))?;
                if !verify_password(current, &account.password_hash).await {
                    AppLogger::log_auth_event(&account.id, "password_change", false, None);
                    return Err(AppError::auth_invalid("Current password is incorrect"));
                }
                validate_password(new_password)?;
                Some(self.hash_password(new_password).await?)
            }
            None => None,
        };

        let update = ProfileUpdate {
            display_name: change.display_name.map(|name| name.trim().to_owned()),
            password_hash,
        };
        let changed_password = update.password_hash.is_some();
        let updated = self
            .store
            .update_user_profile(&account.id, update)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        if changed_password {
            AppLogger::log_auth_event(&account.id, "password_change", true, None);
        }
        Ok(updated)
    }

    fn decode_claims(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::auth_expired(),
                kind => {
                    debug!(error = ?kind, "Token validation failed");
                    AppError::auth_invalid("Invalid authentication token")
                }
            })
    }

    async fn hash_password(&self, password: &str) -> AppResult<String> {
        let password = password.to_owned();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))
    }
}

/// Verify a password on the blocking pool
async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Extract the bearer token from an `Authorization` header
///
/// # Errors
///
/// Returns `AuthInvalid` when the header is present but is not a bearer token
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let malformed = || AppError::auth_invalid("Malformed Authorization header");
    let value = value.to_str().map_err(|_| malformed())?;
    let (scheme, token) = value.split_once(' ').ok_or_else(malformed)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(malformed());
    }
    Ok(Some(token))
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid {
        return Err(AppError::invalid_input("Invalid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < limits::MIN_PASSWORD_LEN {
        return Err(AppError::invalid_input(format!(
            "Password must be at least {} characters",
            limits::MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("xyz"));

        for bad in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer   ", "token"] {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(bad));
            assert!(bearer_token(&headers).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        for bad in ["", "ada", "@example.com", "ada@", "ada@localhost", "ada@.com"] {
            assert!(normalize_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }
}
