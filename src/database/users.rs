// ABOUTME: User account and login session persistence
// ABOUTME: Sessions are keyed by token id so logout can revoke a single token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use super::{now_timestamp, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::models::UserRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, display_name, password_hash, created_at, updated_at";

/// Changes accepted by [`ChatStore::update_user_profile`]
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New display name
    pub display_name: Option<String>,
    /// New bcrypt hash
    pub password_hash: Option<String>,
}

fn user_from_row(row: &SqliteRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl ChatStore {
    pub(super) async fn migrate_users(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                display_name TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                revoked_at TEXT
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        ])
        .await
    }

    /// Create a user account
    ///
    /// # Errors
    ///
    /// Returns `ResourceAlreadyExists` if the email is taken, or a database error
    pub async fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
        password_hash: &str,
    ) -> AppResult<UserRecord> {
        let id = Uuid::now_v7().to_string();
        let now = now_timestamp();

        sqlx::query(
            r"
            INSERT INTO users (id, email, display_name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ",
        )
        .bind(&id)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::already_exists("A user with this email")
            }
            other => AppError::database(format!("Failed to create user: {other}")),
        })?;

        Ok(UserRecord {
            id,
            email: email.to_owned(),
            display_name: display_name.map(ToOwned::to_owned),
            password_hash: password_hash.to_owned(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a user by ID
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get user: {e}")))?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by email
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn get_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get user by email: {e}")))?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Update profile fields that are present in `update`
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> AppResult<Option<UserRecord>> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET display_name = COALESCE($1, display_name),
                password_hash = COALESCE($2, password_hash),
                updated_at = $3
            WHERE id = $4
            ",
        )
        .bind(&update.display_name)
        .bind(&update.password_hash)
        .bind(now_timestamp())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update profile: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(user_id).await
    }

    /// Record a newly issued session token
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        expires_at: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now_timestamp())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;
        Ok(())
    }

    /// Whether the session exists, is unexpired at `now` and not revoked
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn is_session_active(&self, session_id: &str, now: &str) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sessions WHERE id = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to check session: {e}")))?;

        Ok(found.is_some())
    }

    /// Revoke a session; returns false when it was unknown or already revoked
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn revoke_session(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(now_timestamp())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to revoke session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
