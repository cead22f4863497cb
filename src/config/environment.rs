// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses environment variables into a typed server configuration with defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! Environment-based configuration
//!
//! Every setting has a default so the server starts with an empty
//! environment. Values that are present but malformed are rejected at
//! startup rather than silently replaced.

use crate::constants::defaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Type-safe database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database file
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory SQLite (tests, throwaway runs)
    Memory,
}

impl DatabaseUrl {
    /// Parse a `sqlite:` URL; bare paths are treated as SQLite files
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite://").or_else(|| s.strip_prefix("sqlite:")).unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::parse_url(defaults::DATABASE_URL)
    }
}

impl std::fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Model recorded on conversations created without one
    pub default_model: String,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Generation service configuration
    pub llm: LlmConfig,
    /// Session authentication configuration
    pub auth: AuthConfig,
    /// Share link configuration
    pub sharing: SharingConfig,
    /// Title generation configuration
    pub titles: TitleConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database location
    pub url: DatabaseUrl,
}

/// OpenAI-compatible generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL ending in `/v1`
    pub base_url: String,
    /// Bearer key, empty for local servers
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model sent to the endpoint when the conversation names none
    pub model: String,
    /// Optional system prompt prepended to every turn
    pub system_prompt: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret, a random one is generated per process when unset
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    /// Token lifetime in hours
    pub jwt_expiry_hours: i64,
}

/// Share link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingConfig {
    /// Base used to build `{base}/shared/{token}` URLs
    pub public_base_url: String,
    /// Reaper interval, zero disables the reaper
    pub reap_interval_secs: u64,
    /// How long an expired share survives before being reaped
    pub reap_grace_secs: u64,
}

/// Title generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Upper bound on one title job in seconds
    pub timeout_secs: u64,
}

impl TitleConfig {
    /// Title job timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Cross-origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins, `*` allows any
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| env_var_or(&lookup, key, default);
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let default_model = optional("DEFAULT_MODEL").unwrap_or_else(|| defaults::MODEL.to_owned());

        let config = Self {
            http_port: var_or("HTTP_PORT", &defaults::HTTP_PORT.to_string())
                .parse()
                .context("Invalid HTTP_PORT value")?,
            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&var_or("DATABASE_URL", defaults::DATABASE_URL)),
            },
            llm: LlmConfig {
                base_url: var_or("LLM_BASE_URL", defaults::LLM_BASE_URL)
                    .trim_end_matches('/')
                    .to_owned(),
                api_key: optional("LLM_API_KEY"),
                model: optional("LLM_MODEL").unwrap_or_else(|| default_model.clone()),
                system_prompt: optional("LLM_SYSTEM_PROMPT"),
                connect_timeout_secs: var_or(
                    "LLM_CONNECT_TIMEOUT_SECS",
                    &defaults::LLM_CONNECT_TIMEOUT_SECS.to_string(),
                )
                .parse()
                .context("Invalid LLM_CONNECT_TIMEOUT_SECS value")?,
                request_timeout_secs: var_or(
                    "LLM_REQUEST_TIMEOUT_SECS",
                    &defaults::LLM_REQUEST_TIMEOUT_SECS.to_string(),
                )
                .parse()
                .context("Invalid LLM_REQUEST_TIMEOUT_SECS value")?,
            },
            auth: AuthConfig {
                jwt_secret: optional("JWT_SECRET"),
                jwt_expiry_hours: var_or(
                    "JWT_EXPIRY_HOURS",
                    &defaults::JWT_EXPIRY_HOURS.to_string(),
                )
                .parse()
                .context("Invalid JWT_EXPIRY_HOURS value")?,
            },
            sharing: SharingConfig {
                public_base_url: var_or("PUBLIC_BASE_URL", defaults::PUBLIC_BASE_URL)
                    .trim_end_matches('/')
                    .to_owned(),
                reap_interval_secs: var_or("SHARE_REAP_INTERVAL_SECS", "0")
                    .parse()
                    .context("Invalid SHARE_REAP_INTERVAL_SECS value")?,
                reap_grace_secs: var_or(
                    "SHARE_REAP_GRACE_SECS",
                    &defaults::SHARE_REAP_GRACE_SECS.to_string(),
                )
                .parse()
                .context("Invalid SHARE_REAP_GRACE_SECS value")?,
            },
            titles: TitleConfig {
                timeout_secs: var_or(
                    "TITLE_TIMEOUT_SECS",
                    &defaults::TITLE_TIMEOUT_SECS.to_string(),
                )
                .parse()
                .context("Invalid TITLE_TIMEOUT_SECS value")?,
            },
            cors: CorsConfig {
                allowed_origins: parse_origins(&var_or("CORS_ORIGINS", "*")),
            },
            default_model,
        };

        Ok(config)
    }

    /// One-line summary safe to log (no secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Threadline configuration: port={} database={} llm={} model={} system_prompt={} \
             jwt_secret={} public_base_url={} title_timeout={}s share_reaper={}",
            self.http_port,
            self.database.url,
            self.llm.base_url,
            self.llm.model,
            if self.llm.system_prompt.is_some() { "set" } else { "unset" },
            if self.auth.jwt_secret.is_some() { "configured" } else { "ephemeral" },
            self.sharing.public_base_url,
            self.titles.timeout_secs,
            if self.sharing.reap_interval_secs == 0 {
                "disabled".to_owned()
            } else {
                format!("every {}s", self.sharing.reap_interval_secs)
            },
        )
    }
}

fn env_var_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_owned())
}

/// Parse comma-separated CORS origins
fn parse_origins(origins_str: &str) -> Vec<String> {
    if origins_str.trim() == "*" {
        vec!["*".to_owned()]
    } else {
        origins_str
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
