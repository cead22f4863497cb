// ABOUTME: Share link persistence, at most one link per conversation
// ABOUTME: View counting and expiry checks happen in single conditional statements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use super::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::models::ShareLinkRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const SHARE_COLUMNS: &str = "conversation_id, share_token, created_at, expires_at, view_count";

fn share_from_row(row: &SqliteRow) -> ShareLinkRecord {
    ShareLinkRecord {
        conversation_id: row.get("conversation_id"),
        share_token: row.get("share_token"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        view_count: row.get("view_count"),
    }
}

impl ChatStore {
    pub(super) async fn migrate_shares(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS share_links (
                conversation_id TEXT PRIMARY KEY REFERENCES conversations(id) ON DELETE CASCADE,
                share_token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                view_count INTEGER NOT NULL DEFAULT 0
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_share_links_expires ON share_links(expires_at)",
        ])
        .await
    }

    /// Replace the conversation's share link with `share` in one transaction
    ///
    /// The previous token, if any, stops resolving as soon as this commits.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the conversation does not exist, or a
    /// database error
    pub async fn replace_share(&self, share: &ShareLinkRecord) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM conversations WHERE id = $1")
            .bind(&share.conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to look up conversation: {e}")))?;
        if exists.is_none() {
            return Err(AppError::not_found("Conversation"));
        }

        sqlx::query("DELETE FROM share_links WHERE conversation_id = $1")
            .bind(&share.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to remove previous share: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO share_links (conversation_id, share_token, created_at, expires_at, view_count)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&share.conversation_id)
        .bind(&share.share_token)
        .bind(&share.created_at)
        .bind(&share.expires_at)
        .bind(share.view_count)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to create share: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit share: {e}")))
    }

    /// The conversation's share link, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_share_for_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<ShareLinkRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SHARE_COLUMNS} FROM share_links WHERE conversation_id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get share: {e}")))?;

        Ok(row.as_ref().map(share_from_row))
    }

    /// Look up a share link by token, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_share_by_token(&self, token: &str) -> AppResult<Option<ShareLinkRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SHARE_COLUMNS} FROM share_links WHERE share_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get share: {e}")))?;

        Ok(row.as_ref().map(share_from_row))
    }

    /// Count one view of a live share and return the updated record
    ///
    /// Returns `None` when the token is unknown or expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn record_share_view(
        &self,
        token: &str,
        now: &str,
    ) -> AppResult<Option<ShareLinkRecord>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE share_links
            SET view_count = view_count + 1
            WHERE share_token = $1 AND (expires_at IS NULL OR expires_at > $2)
            RETURNING {SHARE_COLUMNS}
            "
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to record share view: {e}")))?;

        Ok(row.as_ref().map(share_from_row))
    }

    /// Remove the conversation's share link
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn delete_share(&self, conversation_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM share_links WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete share: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete shares that expired before `cutoff`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn delete_shares_expired_before(&self, cutoff: &str) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM share_links WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to reap shares: {e}")))?;

        Ok(result.rows_affected())
    }
}
