//! Error types for delivery and inbound payload validation.
//!
//! Neither kind ever reaches a client: delivery errors are isolated to one
//! destination and payload errors drop a single message.

use crate::registry::ConnectionId;

/// Why a message could not be handed to a connection's outbox.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("outbox for connection {0} is full")]
    Backpressure(ConnectionId),

    #[error("outbox for connection {0} is closed")]
    Closed(ConnectionId),

    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

/// Why a structured inbound payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid {msg_type} payload: {reason}")]
    InvalidData {
        msg_type: &'static str,
        reason: String,
    },

    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
}

impl PayloadError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidData { .. } => "invalid_data",
            Self::UnsupportedType(_) => "unsupported_type",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let err = PayloadError::UnsupportedType("user_joined".into());
        assert_eq!(err.error_code(), "unsupported_type");

        let err = PayloadError::InvalidData {
            msg_type: "cursor_update",
            reason: "missing field `x`".into(),
        };
        assert_eq!(err.error_code(), "invalid_data");
        assert!(err.to_string().contains("cursor_update"));
    }

    #[test]
    fn delivery_error_display_names_connection() {
        let err = DeliveryError::Backpressure(ConnectionId(7));
        assert_eq!(err.to_string(), "outbox for connection conn-7 is full");
    }
}
