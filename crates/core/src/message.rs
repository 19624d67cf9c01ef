//! Message and session domain types.
//!
//! These are the value objects that flow through the entire system:
//! caller sends a message → session history is loaded → the engine sends a
//! trimmed slice upstream → the reply is appended and the history saved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a conversation thread. Always UUID-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id only if it is a syntactically valid UUID.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        Uuid::parse_str(trimmed)
            .ok()
            .map(|_| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The pinned instruction message
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the message was created (system messages carry none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// Create a new assistant message stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Length in characters (not bytes); all history budgets count characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Ordered, oldest-first conversation history.
pub type History = Vec<Message>;

/// A stored session: its history and the moment it stops being valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub history: History,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_accepts_uuid() {
        let id = SessionId::parse("6f1c2a52-3a9e-4d55-9a7e-1f0c3b2f7d10").unwrap();
        assert_eq!(id.as_str(), "6f1c2a52-3a9e-4d55-9a7e-1f0c3b2f7d10");
    }

    #[test]
    fn session_id_rejects_garbage() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("not-a-uuid").is_none());
        assert!(SessionId::parse("../../etc/passwd").is_none());
    }

    #[test]
    fn minted_ids_are_valid_and_distinct() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(SessionId::parse(a.as_str()).is_some());
    }

    #[test]
    fn char_len_counts_characters_not_bytes() {
        let msg = Message::user("привет");
        assert_eq!(msg.char_len(), 6);
        assert_eq!(msg.content.len(), 12);
    }

    #[test]
    fn system_message_has_no_timestamp() {
        let msg = Message::system("be brief");
        assert!(msg.is_system());
        assert!(msg.created_at.is_none());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("created_at"));
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn record_expiry() {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: SessionId::new(),
            history: vec![],
            expires_at: now,
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - chrono::Duration::seconds(1)));
    }
}
