// ABOUTME: Share link lifecycle: create, status, revoke, resolve, and optional reaping
// ABOUTME: Expiry is evaluated lazily at access time; expired links answer Gone, missing ones NotFound
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Share Links
//!
//! A conversation has at most one share link. Creating a share replaces the
//! previous one, so the old token stops resolving immediately. Resolution is
//! the only read path for non-owners:
//!
//! | token state               | outcome              |
//! |---------------------------|----------------------|
//! | live                      | snapshot, views + 1  |
//! | expired (`now >= expiry`) | `ResourceGone` (410) |
//! | revoked or never issued   | `ResourceNotFound`   |
//!
//! Expired rows are left in place unless [`ShareReaper`] is enabled.

use crate::constants::limits;
use crate::database::{format_timestamp, now_timestamp, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::models::{ConversationRecord, MessageRecord, ShareLinkRecord};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A freshly created share link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// Public URL of the shared view
    pub url: String,
    /// Token embedded in the URL
    pub share_token: String,
    /// When the link was issued
    pub created_at: String,
    /// Optional expiry
    pub expires_at: Option<String>,
}

/// Share state of a conversation as seen by its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareStatus {
    /// Whether a live share exists
    pub shared: bool,
    /// A share exists but its expiry has passed
    #[serde(default)]
    pub expired: bool,
    /// Public URL of the shared view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Token embedded in the URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    /// When the link was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Optional expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Successful resolutions so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<i64>,
}

/// Conversation fields exposed to share viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedConversationInfo {
    /// Conversation ID
    pub id: String,
    /// Title at the time of viewing
    pub title: String,
    /// Model used
    pub model: String,
    /// When the conversation was created
    pub created_at: String,
    /// When the conversation was last updated
    pub updated_at: String,
}

impl From<ConversationRecord> for SharedConversationInfo {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            model: record.model,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Share metadata returned alongside a resolved snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedLinkInfo {
    /// When the link was issued
    pub created_at: String,
    /// Optional expiry
    pub expires_at: Option<String>,
    /// Views including this one
    pub view_count: i64,
}

/// Read-only snapshot served for a share token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConversation {
    /// The conversation
    pub conversation: SharedConversationInfo,
    /// Its messages in order
    pub messages: Vec<MessageRecord>,
    /// Link metadata
    pub share: SharedLinkInfo,
}

/// Share link lifecycle manager
#[derive(Clone)]
pub struct ShareManager {
    store: ChatStore,
    public_base_url: String,
    rng: SystemRandom,
}

impl ShareManager {
    /// Create a manager building URLs under `public_base_url`
    #[must_use]
    pub fn new(store: ChatStore, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_owned(),
            rng: SystemRandom::new(),
        }
    }

    /// Public URL for a token
    #[must_use]
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/shared/{token}", self.public_base_url)
    }

    /// Issue a new share link, replacing any existing one
    ///
    /// An `expires_at` in the past is accepted; such a link resolves as
    /// expired straight away.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the conversation does not exist
    pub async fn create_share(
        &self,
        conversation_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ShareLink> {
        let record = ShareLinkRecord {
            conversation_id: conversation_id.to_owned(),
            share_token: generate_share_token(&self.rng)?,
            created_at: now_timestamp(),
            expires_at: expires_at.map(format_timestamp),
            view_count: 0,
        };
        self.store.replace_share(&record).await?;

        AppLogger::log_share_event(conversation_id, "created", record.expires_at.as_deref());
        Ok(ShareLink {
            url: self.share_url(&record.share_token),
            share_token: record.share_token,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }

    /// Current share state of a conversation
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the conversation does not exist
    pub async fn share_status(&self, conversation_id: &str) -> AppResult<ShareStatus> {
        if self.store.get_conversation(conversation_id).await?.is_none() {
            return Err(AppError::not_found("Conversation"));
        }

        let Some(share) = self.store.get_share_for_conversation(conversation_id).await? else {
            return Ok(ShareStatus {
                shared: false,
                expired: false,
                url: None,
                share_token: None,
                created_at: None,
                expires_at: None,
                view_count: None,
            });
        };

        let expired = is_expired(&share, &now_timestamp());
        Ok(ShareStatus {
            shared: !expired,
            expired,
            url: Some(self.share_url(&share.share_token)),
            share_token: Some(share.share_token),
            created_at: Some(share.created_at),
            expires_at: share.expires_at,
            view_count: Some(share.view_count),
        })
    }

    /// Revoke the conversation's share link
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when there is nothing to revoke
    pub async fn revoke_share(&self, conversation_id: &str) -> AppResult<()> {
        if !self.store.delete_share(conversation_id).await? {
            return Err(AppError::not_found("Share link"));
        }
        AppLogger::log_share_event(conversation_id, "revoked", None);
        Ok(())
    }

    /// Resolve a token to a read-only snapshot, counting the view
    ///
    /// # Errors
    ///
    /// Returns `ResourceGone` for an expired link and `ResourceNotFound` for
    /// an unknown or revoked one
    pub async fn resolve_share(&self, token: &str) -> AppResult<SharedConversation> {
        let now = now_timestamp();
        let Some(share) = self.store.record_share_view(token, &now).await? else {
            return Err(match self.store.get_share_by_token(token).await? {
                Some(_) => {
                    debug!("Share link resolved after expiry");
                    AppError::gone("Share link")
                }
                None => AppError::not_found("Share link"),
            });
        };

        let conversation = self
            .store
            .get_conversation(&share.conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Share link"))?;
        let messages = self.store.list_messages(&share.conversation_id).await?;

        debug!(
            conversation_id = %share.conversation_id,
            view_count = share.view_count,
            "Share link resolved"
        );
        Ok(SharedConversation {
            conversation: conversation.into(),
            messages,
            share: SharedLinkInfo {
                created_at: share.created_at,
                expires_at: share.expires_at,
                view_count: share.view_count,
            },
        })
    }
}

fn is_expired(share: &ShareLinkRecord, now: &str) -> bool {
    share
        .expires_at
        .as_deref()
        .is_some_and(|expires_at| expires_at <= now)
}

/// Generate an unguessable URL-safe share token
///
/// # Errors
///
/// Returns an error if the system random source fails
pub fn generate_share_token(rng: &SystemRandom) -> AppResult<String> {
    let mut bytes = [0u8; limits::SHARE_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::internal("System random source unavailable"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Background task deleting long-expired share links
///
/// Links that expired less than `grace` ago are kept, so they keep
/// answering Gone for a while before turning into NotFound.
pub struct ShareReaper {
    store: ChatStore,
    interval: Duration,
    grace: Duration,
}

impl ShareReaper {
    /// Create a reaper
    #[must_use]
    pub const fn new(store: ChatStore, interval: Duration, grace: Duration) -> Self {
        Self {
            store,
            interval,
            grace,
        }
    }

    /// Delete links expired for longer than the grace period
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails
    pub async fn reap_once(&self) -> AppResult<u64> {
        let grace = chrono::Duration::from_std(self.grace)
            .map_err(|e| AppError::config(format!("Share reap grace period out of range: {e}")))?;
        let cutoff = format_timestamp(Utc::now() - grace);
        let removed = self.store.delete_shares_expired_before(&cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "Reaped expired share links");
        }
        Ok(removed)
    }

    /// Run forever on the configured interval
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.reap_once().await {
                    warn!(error = %e, "Share reaping failed");
                }
            }
        })
    }
}
