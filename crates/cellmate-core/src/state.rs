//! UI-agnostic conversation state types
//!
//! This module contains data structures that are shared between the chat state
//! machine, the gateway wire format and any presentation layer (terminal,
//! notebook panel, etc.) without depending on a specific UI framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// A `{role, content}` pair as sent to the backend in a chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Lifecycle of a single transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Resolved,
    Errored,
}

/// Opaque correlation key of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    fn generate(role: ChatRole) -> Self {
        Self(format!("{}-{}", role.as_str(), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a conversation transcript.
///
/// Fields are read-only outside this crate; only the owning
/// [`Conversation`](crate::Conversation) moves a pending turn to its terminal
/// status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    role: ChatRole,
    content: String,
    timestamp: DateTime<Utc>,
    status: TurnStatus,
}

/// Content shown for an assistant turn while its response is outstanding.
pub const PENDING_PLACEHOLDER: &str = "...";

impl Turn {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(ChatRole::User),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            status: TurnStatus::Resolved,
        }
    }

    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(ChatRole::System),
            role: ChatRole::System,
            content: content.into(),
            timestamp: Utc::now(),
            status: TurnStatus::Resolved,
        }
    }

    pub(crate) fn pending_assistant() -> Self {
        Self {
            id: TurnId::generate(ChatRole::Assistant),
            role: ChatRole::Assistant,
            content: PENDING_PLACEHOLDER.to_string(),
            timestamp: Utc::now(),
            status: TurnStatus::Pending,
        }
    }

    /// Moves a pending turn to `status`. Returns false if it was already terminal.
    pub(crate) fn settle(&mut self, status: TurnStatus, content: String) -> bool {
        if self.status != TurnStatus::Pending || status == TurnStatus::Pending {
            return false;
        }
        self.status = status;
        self.content = content;
        self.timestamp = Utc::now();
        true
    }

    pub fn id(&self) -> &TurnId {
        &self.id
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> TurnStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == TurnStatus::Pending
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}
