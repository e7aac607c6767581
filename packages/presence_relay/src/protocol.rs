//! Relay Protocol Types
//!
//! Wire messages exchanged over the WebSocket. Every message is a JSON
//! object `{ "type": ..., "userId": ..., "data": ... }` where the shape of
//! `data` is fixed by `type`.

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::store::{Cursor, CursorSnapshot};

/// Closed set of message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    CursorUpdate,
    ChatMessage,
    UserJoined,
    UserLeft,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CursorUpdate => "cursor_update",
            Self::ChatMessage => "chat_message",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cursor_update" => Some(Self::CursorUpdate),
            "chat_message" => Some(Self::ChatMessage),
            "user_joined" => Some(Self::UserJoined),
            "user_left" => Some(Self::UserLeft),
            _ => None,
        }
    }

    /// Whether clients may send this type. Join and leave notices are
    /// authored by the server only.
    pub fn accepted_from_client(&self) -> bool {
        matches!(self, Self::CursorUpdate | Self::ChatMessage)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Client -> server ===

/// `data` of an inbound `cursor_update`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// `data` of an inbound `chat_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatText {
    pub message: String,
}

/// Structured requests a client is allowed to send. Any `userId` the
/// client supplies is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    CursorUpdate { data: CursorPosition },
    ChatMessage { data: ChatText },
}

/// A decoded inbound payload. Decoding never fails; payloads that cannot
/// be used end up as `Rejected`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CursorUpdate(CursorPosition),
    ChatMessage(ChatText),
    /// Payload that was not a typed JSON object; relayed as chat text.
    PlainText(String),
    Rejected(PayloadError),
}

impl ClientMessage {
    /// Type tag the message is handled as, if any.
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::CursorUpdate(_) => Some(MessageType::CursorUpdate),
            Self::ChatMessage(_) | Self::PlainText(_) => Some(MessageType::ChatMessage),
            Self::Rejected(_) => None,
        }
    }
}

impl From<ClientRequest> for ClientMessage {
    fn from(req: ClientRequest) -> Self {
        match req {
            ClientRequest::CursorUpdate { data } => Self::CursorUpdate(data),
            ClientRequest::ChatMessage { data } => Self::ChatMessage(data),
        }
    }
}

// === Server -> client ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorBroadcast {
    pub user_id: String,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast {
    pub user_id: String,
    pub message: String,
    /// RFC 3339 server time.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedData {
    pub user_id: String,
    pub message: String,
    /// Present only in the welcome sent to the joining connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursors: Option<CursorSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftData {
    pub user_id: String,
    pub message: String,
}

/// Messages sent FROM the server TO clients. `userId` is always the
/// server-assigned identity the message is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    CursorUpdate {
        #[serde(rename = "userId")]
        user_id: String,
        data: CursorBroadcast,
    },
    ChatMessage {
        #[serde(rename = "userId")]
        user_id: String,
        data: ChatBroadcast,
    },
    UserJoined {
        #[serde(rename = "userId")]
        user_id: String,
        data: UserJoinedData,
    },
    UserLeft {
        #[serde(rename = "userId")]
        user_id: String,
        data: UserLeftData,
    },
}

impl ServerMessage {
    pub fn cursor_update(identity: &str, cursor: Cursor) -> Self {
        Self::CursorUpdate {
            user_id: identity.to_string(),
            data: CursorBroadcast {
                user_id: identity.to_string(),
                cursor,
            },
        }
    }

    pub fn chat(identity: &str, message: String) -> Self {
        Self::ChatMessage {
            user_id: identity.to_string(),
            data: ChatBroadcast {
                user_id: identity.to_string(),
                message,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Greeting for a newly opened connection, carrying the cursors known
    /// at the time it joined.
    pub fn welcome(identity: &str, cursors: CursorSnapshot) -> Self {
        Self::UserJoined {
            user_id: identity.to_string(),
            data: UserJoinedData {
                user_id: identity.to_string(),
                message: format!("Welcome! You are {}", identity),
                cursors: Some(cursors),
            },
        }
    }

    /// Notice to existing peers that `identity` joined.
    pub fn joined(identity: &str) -> Self {
        Self::UserJoined {
            user_id: identity.to_string(),
            data: UserJoinedData {
                user_id: identity.to_string(),
                message: format!("{} joined", identity),
                cursors: None,
            },
        }
    }

    pub fn left(identity: &str) -> Self {
        Self::UserLeft {
            user_id: identity.to_string(),
            data: UserLeftData {
                user_id: identity.to_string(),
                message: format!("{} left", identity),
            },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::CursorUpdate { .. } => MessageType::CursorUpdate,
            Self::ChatMessage { .. } => MessageType::ChatMessage,
            Self::UserJoined { .. } => MessageType::UserJoined,
            Self::UserLeft { .. } => MessageType::UserLeft,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::CursorUpdate { user_id, .. }
            | Self::ChatMessage { user_id, .. }
            | Self::UserJoined { user_id, .. }
            | Self::UserLeft { user_id, .. } => user_id,
        }
    }
}
