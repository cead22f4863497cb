// ABOUTME: Application-wide constants grouped by domain
// ABOUTME: Defaults for configuration, input limits and service names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

/// Service names used in structured logs
pub mod service_names {
    /// The HTTP server binary
    pub const THREADLINE_SERVER: &str = "threadline-server";
}

/// Configuration defaults applied when an environment variable is unset
pub mod defaults {
    /// HTTP listen port
    pub const HTTP_PORT: u16 = 3001;
    /// Database location
    pub const DATABASE_URL: &str = "sqlite:./data/threadline.db";
    /// OpenAI-compatible endpoint (a local Ollama instance)
    pub const LLM_BASE_URL: &str = "http://localhost:11434/v1";
    /// Model recorded on new conversations and used for generation
    pub const MODEL: &str = "qwen2.5:14b-instruct";
    /// Connection timeout for the generation service
    pub const LLM_CONNECT_TIMEOUT_SECS: u64 = 30;
    /// Whole-request timeout for the generation service
    pub const LLM_REQUEST_TIMEOUT_SECS: u64 = 300;
    /// Upper bound on one title job
    pub const TITLE_TIMEOUT_SECS: u64 = 15;
    /// Session token lifetime
    pub const JWT_EXPIRY_HOURS: i64 = 24;
    /// Base of shareable URLs
    pub const PUBLIC_BASE_URL: &str = "http://localhost:3001";
    /// Expired shares are kept this long before the reaper removes them
    pub const SHARE_REAP_GRACE_SECS: u64 = 7 * 24 * 3600;
    /// SQLite busy timeout for file databases
    pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;
    /// Pool size for file databases
    pub const SQLITE_MAX_CONNECTIONS: u32 = 8;
}

/// Input limits
pub mod limits {
    /// Maximum characters in a generated title
    pub const MAX_TITLE_CHARS: usize = 60;
    /// Maximum characters in a user supplied title
    pub const MAX_USER_TITLE_CHARS: usize = 200;
    /// Maximum characters in one user message
    pub const MAX_MESSAGE_CHARS: usize = 32_000;
    /// Default page size for conversation listings
    pub const DEFAULT_LIST_LIMIT: i64 = 50;
    /// Largest accepted page size
    pub const MAX_LIST_LIMIT: i64 = 200;
    /// Random bytes in a share token
    pub const SHARE_TOKEN_BYTES: usize = 32;
    /// Minimum password length at registration
    pub const MIN_PASSWORD_LEN: usize = 8;
    /// Characters of each message quoted in the title prompt
    pub const TITLE_CONTEXT_CHARS: usize = 2_000;
}
