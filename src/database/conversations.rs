// ABOUTME: Conversation CRUD and the persisted title ownership flag
// ABOUTME: Automatic titles are claimed and applied with conditional updates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use super::{now_timestamp, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ConversationRecord, ConversationSummary, TitleState, DEFAULT_CONVERSATION_TITLE,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str =
    "id, title, model, project_id, user_id, title_state, created_at, updated_at";

/// Input for [`ChatStore::create_conversation`]
#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    /// Explicit title; when present the title is user-owned from the start
    pub title: Option<String>,
    /// Model recorded on the conversation
    pub model: String,
    /// Optional grouping project
    pub project_id: Option<String>,
    /// Owning user
    pub user_id: Option<String>,
}

/// Partial update for [`ChatStore::update_conversation`]
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    /// New title, takes ownership of the title away from the generator
    pub title: Option<String>,
    /// New model
    pub model: Option<String>,
}

fn conversation_from_row(row: &SqliteRow) -> ConversationRecord {
    let title_state: String = row.get("title_state");
    ConversationRecord {
        id: row.get("id"),
        title: row.get("title"),
        model: row.get("model"),
        project_id: row.get("project_id"),
        user_id: row.get("user_id"),
        title_state: TitleState::parse(&title_state),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl ChatStore {
    pub(super) async fn migrate_conversations(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                model TEXT NOT NULL,
                project_id TEXT,
                user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
                title_state TEXT NOT NULL DEFAULT 'pending'
                    CHECK (title_state IN ('pending', 'claimed', 'auto', 'user')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                seq INTEGER NOT NULL,
                token_count INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE (conversation_id, seq)
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq)",
        ])
        .await
    }

    /// Create a new conversation
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_conversation(&self, input: NewConversation) -> AppResult<ConversationRecord> {
        let id = Uuid::now_v7().to_string();
        let now = now_timestamp();
        let (title, title_state) = match input.title {
            Some(title) => (title, TitleState::User),
            None => (DEFAULT_CONVERSATION_TITLE.to_owned(), TitleState::Pending),
        };

        sqlx::query(
            r"
            INSERT INTO conversations (id, title, model, project_id, user_id, title_state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ",
        )
        .bind(&id)
        .bind(&title)
        .bind(&input.model)
        .bind(&input.project_id)
        .bind(&input.user_id)
        .bind(title_state.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(ConversationRecord {
            id,
            title,
            model: input.model,
            project_id: input.project_id,
            user_id: input.user_id,
            title_state,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a conversation by ID
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_conversation(&self, conversation_id: &str) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    /// List conversations owned by `user_id` (anonymous ones for `None`),
    /// most recently updated first
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn list_conversations(
        &self,
        user_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.title, c.model, c.project_id, c.created_at, c.updated_at,
                   COUNT(m.id) AS message_count
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            WHERE c.user_id IS $1
            GROUP BY c.id
            ORDER BY c.updated_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| ConversationSummary {
                id: r.get("id"),
                title: r.get("title"),
                model: r.get("model"),
                project_id: r.get("project_id"),
                message_count: r.get("message_count"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    /// Count conversations owned by `user_id` (anonymous ones for `None`)
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn count_conversations(&self, user_id: Option<&str>) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE user_id IS $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count conversations: {e}")))
    }

    /// Set a user-chosen title; automatic titling is disabled from here on
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        self.update_conversation(
            conversation_id,
            ConversationPatch {
                title: Some(title.to_owned()),
                model: None,
            },
        )
        .await
    }

    /// Apply a partial update
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> AppResult<Option<ConversationRecord>> {
        let _guard = self.locks.lock(conversation_id).await;

        let result = sqlx::query(
            r"
            UPDATE conversations
            SET title = COALESCE($1, title),
                model = COALESCE($2, model),
                title_state = CASE WHEN $1 IS NULL THEN title_state ELSE 'user' END,
                updated_at = $3
            WHERE id = $4
            ",
        )
        .bind(&patch.title)
        .bind(&patch.model)
        .bind(now_timestamp())
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(conversation_id).await
    }

    /// Delete a conversation; messages and its share link cascade
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn delete_conversation(&self, conversation_id: &str) -> AppResult<bool> {
        let _guard = self.locks.lock(conversation_id).await;

        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Take ownership of the automatic title
    ///
    /// Succeeds for exactly one caller over the conversation's lifetime, and
    /// never once a user has set the title. The claim is not released on
    /// failure, so a failed attempt is not retried.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn claim_auto_title(&self, conversation_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE conversations SET title_state = 'claimed' WHERE id = $1 AND title_state = 'pending'",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to claim title: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    /// Write the generated title if the claim still stands
    ///
    /// Returns `None` when a user renamed the conversation after the claim,
    /// or the conversation was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn apply_auto_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        let _guard = self.locks.lock(conversation_id).await;

        let result = sqlx::query(
            r"
            UPDATE conversations
            SET title = $1, title_state = 'auto', updated_at = $2
            WHERE id = $3 AND title_state = 'claimed'
            ",
        )
        .bind(title)
        .bind(now_timestamp())
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to apply title: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_conversation(conversation_id).await
    }
}
