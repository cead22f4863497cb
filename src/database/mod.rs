// ABOUTME: SQLite-backed conversation store with schema migrations
// ABOUTME: Owns the connection pool and the per-conversation write locks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Conversation Store
//!
//! [`ChatStore`] is the single source of truth for conversations, messages,
//! share links, users and sessions. Operations are split across submodules
//! by record type; each adds an `impl ChatStore` block.
//!
//! Writes that must observe a consistent per-conversation order (message
//! appends, renames, automatic titles, deletes) run inside the conversation's
//! critical section from `ConversationLocks`. Different conversations never
//! contend with each other.

mod conversations;
mod locks;
mod messages;
mod shares;
mod users;

pub use conversations::{ConversationPatch, NewConversation};
use locks::ConversationLocks;
pub use users::ProfileUpdate;

use crate::config::DatabaseUrl;
use crate::constants::defaults;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, info};

/// Conversation store over a SQLite pool
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
    locks: ConversationLocks,
}

impl ChatStore {
    /// Open the database, creating it when missing, and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated
    pub async fn connect(url: &DatabaseUrl) -> AppResult<Self> {
        let pool = match url {
            DatabaseUrl::Memory => {
                // Every connection to :memory: is a separate database, so the
                // pool is pinned to one connection that is never recycled.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
                    .await
            }
            DatabaseUrl::SQLite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::database(format!(
                            "Failed to create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(defaults::SQLITE_BUSY_TIMEOUT_SECS))
                    .foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(defaults::SQLITE_MAX_CONNECTIONS)
                    .connect_with(options)
                    .await
            }
        }
        .map_err(|e| AppError::database(format!("Failed to open database {url}: {e}")))?;

        let store = Self {
            pool,
            locks: ConversationLocks::default(),
        };
        store.migrate().await?;
        info!(database = %url, "Conversation store ready");
        Ok(store)
    }

    /// Get a reference to the database pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap liveness probe used by the readiness endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not answer
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Database ping failed: {e}")))?;
        Ok(())
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_users().await?;
        self.migrate_conversations().await?;
        self.migrate_shares().await?;
        debug!("Database migrations applied");
        Ok(())
    }

    async fn execute_schema(&self, statements: &[&str]) -> AppResult<()> {
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }
}

/// Canonical stored timestamp: RFC 3339, UTC, millisecond precision
///
/// The fixed width keeps lexical and chronological order identical, which
/// the expiry comparisons in SQL rely on.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in the stored timestamp format
#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_fixed_width_utc() {
        let early = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 11, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(early), "2025-01-02T03:04:05.000Z");
        assert!(format_timestamp(early) < format_timestamp(late));
    }
}
