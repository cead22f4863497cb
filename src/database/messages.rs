// ABOUTME: Message persistence with per-conversation insertion ordinals
// ABOUTME: Appends run inside the conversation's critical section so seq follows issue order
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use super::{now_timestamp, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::models::{MessageRecord, MessageRole};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn message_from_row(row: &SqliteRow) -> AppResult<MessageRecord> {
    let role: String = row.get("role");
    let role = MessageRole::parse(&role)
        .ok_or_else(|| AppError::database(format!("Unknown message role in store: {role}")))?;

    Ok(MessageRecord {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role,
        content: row.get("content"),
        seq: row.get("seq"),
        token_count: row.get("token_count"),
        created_at: row.get("created_at"),
    })
}

impl ChatStore {
    /// Append a message and bump the conversation's `updated_at`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the conversation does not exist, or a
    /// database error
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        token_count: Option<i64>,
    ) -> AppResult<MessageRecord> {
        if role == MessageRole::System {
            return Err(AppError::invalid_input("System messages are not stored"));
        }

        let _guard = self.locks.lock(conversation_id).await;

        let id = Uuid::now_v7().to_string();
        let now = now_timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch conversation: {e}")))?;
        if touched.rows_affected() == 0 {
            return Err(AppError::not_found("Conversation"));
        }

        let seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to compute message order: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, role, content, seq, token_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(seq)
        .bind(token_count)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to add message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit message: {e}")))?;

        Ok(MessageRecord {
            id,
            conversation_id: conversation_id.to_owned(),
            role,
            content: content.to_owned(),
            seq,
            token_count,
            created_at: now,
        })
    }

    /// All messages of a conversation in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_messages(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, role, content, seq, token_count, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY seq ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get messages: {e}")))?;

        rows.iter().map(message_from_row).collect()
    }

    /// Number of stored messages in a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn count_messages(&self, conversation_id: &str) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count messages: {e}")))
    }
}
