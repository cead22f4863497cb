// ABOUTME: Persisted record types for conversations, messages, share links and users
// ABOUTME: Serialized with camelCase field names for the HTTP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use serde::{Deserialize, Serialize};

/// Title given to conversations created without one
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction (never persisted, prompt only)
    System,
    /// End user
    User,
    /// Generated reply
    Assistant,
}

impl MessageRole {
    /// Stored string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Who owns the conversation title
///
/// Transitions: `Pending -> Claimed -> Auto`, or any state `-> User`.
/// Only the title job that moved the flag to `Claimed` may write an
/// automatic title, and only while the flag is still `Claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleState {
    /// No automatic title attempted yet
    Pending,
    /// A title job owns the automatic title
    Claimed,
    /// The automatic title has been written
    Auto,
    /// A user set the title
    User,
}

impl TitleState {
    /// Stored string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Auto => "auto",
            Self::User => "user",
        }
    }

    /// Parse the stored string form, unknown values count as user-owned
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "claimed" => Self::Claimed,
            "auto" => Self::Auto,
            _ => Self::User,
        }
    }
}

/// Database representation of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Unique conversation ID (UUID v7)
    pub id: String,
    /// Conversation title
    pub title: String,
    /// Model used for generation
    pub model: String,
    /// Optional grouping project
    pub project_id: Option<String>,
    /// Owning user, absent for anonymous conversations
    pub user_id: Option<String>,
    /// Title ownership flag
    pub title_state: TitleState,
    /// When the conversation was created (RFC 3339)
    pub created_at: String,
    /// When the conversation was last updated (RFC 3339)
    pub updated_at: String,
}

/// Database representation of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Unique message ID (UUID v7)
    pub id: String,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// Author role
    pub role: MessageRole,
    /// Message text, immutable once stored
    pub content: String,
    /// Per-conversation insertion ordinal starting at 1
    pub seq: i64,
    /// Tokens reported by the generation service
    pub token_count: Option<i64>,
    /// When the message was stored (RFC 3339)
    pub created_at: String,
}

/// Conversation listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation ID
    pub id: String,
    /// Conversation title
    pub title: String,
    /// Model used
    pub model: String,
    /// Optional grouping project
    pub project_id: Option<String>,
    /// Number of stored messages
    pub message_count: i64,
    /// When the conversation was created
    pub created_at: String,
    /// When the conversation was last updated
    pub updated_at: String,
}

/// Database representation of a share link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkRecord {
    /// Shared conversation
    pub conversation_id: String,
    /// Unguessable URL-safe token
    pub share_token: String,
    /// When the link was issued (RFC 3339)
    pub created_at: String,
    /// Optional expiry (RFC 3339), absent means never
    pub expires_at: Option<String>,
    /// Successful resolutions so far
    pub view_count: i64,
}

/// Database representation of a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Unique user ID
    pub id: String,
    /// Login email, unique
    pub email: String,
    /// Name shown in the UI
    pub display_name: Option<String>,
    /// bcrypt hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// When the account was created
    pub created_at: String,
    /// When the profile was last changed
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_state_round_trip_and_fallback() {
        for state in [
            TitleState::Pending,
            TitleState::Claimed,
            TitleState::Auto,
            TitleState::User,
        ] {
            assert_eq!(TitleState::parse(state.as_str()), state);
        }
        assert_eq!(TitleState::parse("garbage"), TitleState::User);
    }

    #[test]
    fn test_records_serialize_camel_case() {
        let message = MessageRecord {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: MessageRole::Assistant,
            content: "hi".into(),
            seq: 2,
            token_count: None,
            created_at: "2025-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("conversation_id").is_none());
    }

    #[test]
    fn test_user_record_hides_password_hash() {
        let user = UserRecord {
            id: "u1".into(),
            email: "a@example.com".into(),
            display_name: None,
            password_hash: "$2b$12$secret".into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
