//! Message Router
//!
//! Turns raw inbound payloads into [`ClientMessage`]s and hands each one to
//! the handler for its type. Nothing here can fail a connection: a payload
//! that cannot be used is dropped and logged, and the connection carries on.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::error::PayloadError;
use crate::metrics::RelayMetrics;
use crate::protocol::{ChatText, ClientMessage, ClientRequest, CursorPosition, MessageType, ServerMessage};
use crate::registry::ConnectionId;
use crate::store::CursorStore;

/// Decode a raw text payload. Never fails.
///
/// - Not JSON, or JSON without a `type` field: relayed as chat text equal
///   to the raw payload.
/// - A client type with data of the wrong shape: rejected.
/// - Any other type, including the server-only join/leave notices: rejected
///   as unsupported.
pub fn decode(raw: &str) -> ClientMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        // Well-formed JSON can still fail here, e.g. a number out of f64 range.
        Err(e) => {
            return match sniff_tag(raw) {
                Some(tag) => ClientMessage::Rejected(reject(tag, e.to_string())),
                None => ClientMessage::PlainText(raw.to_string()),
            };
        }
    };

    let tag = match value.as_object().and_then(|o| o.get("type")) {
        Some(tag) => tag_name(tag),
        None => return ClientMessage::PlainText(raw.to_string()),
    };

    match serde_json::from_value::<ClientRequest>(value) {
        Ok(req) => req.into(),
        Err(e) => ClientMessage::Rejected(reject(tag, e.to_string())),
    }
}

/// Only the `type` field; everything else is skipped unparsed.
#[derive(Deserialize)]
struct TagOnly {
    #[serde(rename = "type")]
    tag: Option<Value>,
}

fn sniff_tag(raw: &str) -> Option<String> {
    let tagged: TagOnly = serde_json::from_str(raw).ok()?;
    tagged.tag.as_ref().map(tag_name)
}

fn tag_name(tag: &Value) -> String {
    match tag {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reject(tag: String, reason: String) -> PayloadError {
    match MessageType::parse(&tag) {
        Some(t) if t.accepted_from_client() => PayloadError::InvalidData {
            msg_type: t.as_str(),
            reason,
        },
        _ => PayloadError::UnsupportedType(tag),
    }
}

/// Result of dispatching one message.
#[derive(Debug, PartialEq)]
pub enum DispatchResult {
    /// The message was relayed; `delivered` outboxes accepted it.
    Relayed { delivered: usize },
    /// The message was dropped.
    Dropped(PayloadError),
}

/// Per-type handlers for inbound messages.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<CursorStore>,
    broadcaster: Broadcaster,
    metrics: Arc<RelayMetrics>,
}

impl MessageRouter {
    pub fn new(store: Arc<CursorStore>, broadcaster: Broadcaster, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            store,
            broadcaster,
            metrics,
        }
    }

    /// Route a decoded message from connection `sender`, whose
    /// server-assigned identity is `identity`, to exactly one handler.
    pub async fn dispatch(
        &self,
        sender: ConnectionId,
        identity: &str,
        msg: ClientMessage,
    ) -> DispatchResult {
        match msg {
            ClientMessage::CursorUpdate(pos) => self.handle_cursor_update(sender, identity, pos).await,
            ClientMessage::ChatMessage(ChatText { message }) => {
                self.handle_chat_message(identity, message).await
            }
            ClientMessage::PlainText(text) => {
                self.metrics.plain_text_fallback();
                debug!(
                    conn_id = %sender,
                    identity = %identity,
                    "Unstructured payload, relaying as chat"
                );
                self.handle_chat_message(identity, text).await
            }
            ClientMessage::Rejected(err) => {
                match &err {
                    PayloadError::InvalidData { msg_type, reason } => {
                        self.metrics.payload_rejected();
                        warn!(
                            conn_id = %sender,
                            identity = %identity,
                            msg_type = %msg_type,
                            "Dropping payload: {}", reason
                        );
                    }
                    PayloadError::UnsupportedType(tag) => {
                        self.metrics.unsupported_type();
                        debug!(
                            conn_id = %sender,
                            identity = %identity,
                            msg_type = %tag,
                            "Dropping message of unsupported type"
                        );
                    }
                }
                DispatchResult::Dropped(err)
            }
        }
    }

    /// Store the new position and show it to everyone but the sender.
    async fn handle_cursor_update(
        &self,
        sender: ConnectionId,
        identity: &str,
        pos: CursorPosition,
    ) -> DispatchResult {
        let cursor = self.store.upsert(identity, pos.x, pos.y).await;
        let delivered = self
            .broadcaster
            .send_to_others(sender, &ServerMessage::cursor_update(identity, cursor))
            .await;
        DispatchResult::Relayed { delivered }
    }

    /// Chat goes to everyone, the sender included, as delivery confirmation.
    async fn handle_chat_message(&self, identity: &str, message: String) -> DispatchResult {
        let delivered = self
            .broadcaster
            .send_to_all(&ServerMessage::chat(identity, message))
            .await;
        DispatchResult::Relayed { delivered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use tokio::sync::mpsc;

    #[test]
    fn test_decode_cursor_update() {
        let msg = decode(r#"{"type":"cursor_update","data":{"x":10,"y":20}}"#);
        assert_eq!(msg, ClientMessage::CursorUpdate(CursorPosition { x: 10.0, y: 20.0 }));
    }

    #[test]
    fn test_decode_chat_message() {
        let msg = decode(r#"{"type":"chat_message","data":{"message":"hello"}}"#);
        assert_eq!(
            msg,
            ClientMessage::ChatMessage(ChatText {
                message: "hello".into()
            })
        );
    }

    #[test]
    fn test_decode_non_json_is_plain_text() {
        assert_eq!(decode("hello there"), ClientMessage::PlainText("hello there".into()));
        assert_eq!(decode("{broken"), ClientMessage::PlainText("{broken".into()));
        // Out-of-range numbers without a `type` are still just text.
        let raw = r#"{"x":1e400}"#;
        assert_eq!(decode(raw), ClientMessage::PlainText(raw.into()));
    }

    #[test]
    fn test_decode_json_without_type_is_plain_text() {
        let raw = r#"{"x":10,"y":20}"#;
        assert_eq!(decode(raw), ClientMessage::PlainText(raw.into()));
        assert_eq!(decode("42"), ClientMessage::PlainText("42".into()));
        assert_eq!(decode(r#""quoted""#), ClientMessage::PlainText(r#""quoted""#.into()));
    }

    #[test]
    fn test_decode_cursor_update_with_bad_fields_is_rejected() {
        for raw in [
            r#"{"type":"cursor_update","data":{"x":10}}"#,
            r#"{"type":"cursor_update","data":{"x":"10","y":20}}"#,
            r#"{"type":"cursor_update"}"#,
            r#"{"type":"cursor_update","data":{"x":1e400,"y":0}}"#,
        ] {
            match decode(raw) {
                ClientMessage::Rejected(PayloadError::InvalidData { msg_type, .. }) => {
                    assert_eq!(msg_type, "cursor_update");
                }
                other => panic!("Expected InvalidData for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_server_only_and_unknown_types_are_unsupported() {
        assert_eq!(
            decode(r#"{"type":"user_joined","data":{"userId":"x","message":"hi"}}"#),
            ClientMessage::Rejected(PayloadError::UnsupportedType("user_joined".into()))
        );
        assert_eq!(
            decode(r#"{"type":"user_left","data":{}}"#),
            ClientMessage::Rejected(PayloadError::UnsupportedType("user_left".into()))
        );
        assert_eq!(
            decode(r#"{"type":"typing","data":{}}"#),
            ClientMessage::Rejected(PayloadError::UnsupportedType("typing".into()))
        );
        assert_eq!(
            decode(r#"{"type":"typing","data":{"at":-1e999}}"#),
            ClientMessage::Rejected(PayloadError::UnsupportedType("typing".into()))
        );
        assert_eq!(
            decode(r#"{"type":7}"#),
            ClientMessage::Rejected(PayloadError::UnsupportedType("7".into()))
        );
    }

    struct Harness {
        router: MessageRouter,
        registry: Arc<ConnectionRegistry>,
        store: Arc<CursorStore>,
        metrics: Arc<RelayMetrics>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(CursorStore::new());
        let metrics = Arc::new(RelayMetrics::new());
        let broadcaster = Broadcaster::new(registry.clone(), metrics.clone());
        Harness {
            router: MessageRouter::new(store.clone(), broadcaster, metrics.clone()),
            registry,
            store,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_cursor_update_goes_to_others_only() {
        let h = harness();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = h.registry.register(tx_a).await;
        h.registry.register(tx_b).await;

        let result = h
            .router
            .dispatch(a.id, &a.identity, decode(r#"{"type":"cursor_update","data":{"x":1,"y":2}}"#))
            .await;

        assert_eq!(result, DispatchResult::Relayed { delivered: 1 });
        assert!(rx_a.try_recv().is_err());
        let received: ServerMessage = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        match received {
            ServerMessage::CursorUpdate { user_id, data } => {
                assert_eq!(user_id, a.identity);
                assert_eq!(data.cursor.x, 1.0);
                assert_eq!(data.cursor.y, 2.0);
            }
            other => panic!("Expected CursorUpdate, got {other:?}"),
        }
        assert!(h.store.get(&a.identity).await.is_some());
    }

    #[tokio::test]
    async fn test_plain_text_relayed_to_all_as_chat() {
        let h = harness();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = h.registry.register(tx_a).await;
        h.registry.register(tx_b).await;

        let result = h.router.dispatch(a.id, &a.identity, decode("just words")).await;
        assert_eq!(result, DispatchResult::Relayed { delivered: 2 });

        for rx in [&mut rx_a, &mut rx_b] {
            let received: ServerMessage = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            match received {
                ServerMessage::ChatMessage { user_id, data } => {
                    assert_eq!(user_id, a.identity);
                    assert_eq!(data.message, "just words");
                }
                other => panic!("Expected ChatMessage, got {other:?}"),
            }
        }
        assert_eq!(h.metrics.snapshot().protocol.plain_text_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_rejected_payload_touches_nothing() {
        let h = harness();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = h.registry.register(tx_a).await;
        h.registry.register(tx_b).await;

        let result = h
            .router
            .dispatch(a.id, &a.identity, decode(r#"{"type":"cursor_update","data":{"y":2}}"#))
            .await;
        assert!(matches!(result, DispatchResult::Dropped(PayloadError::InvalidData { .. })));

        let result = h
            .router
            .dispatch(a.id, &a.identity, decode(r#"{"type":"cursor_update","data":{"x":1e400,"y":0}}"#))
            .await;
        assert!(matches!(result, DispatchResult::Dropped(PayloadError::InvalidData { .. })));

        let result = h
            .router
            .dispatch(a.id, &a.identity, decode(r#"{"type":"user_left","data":{}}"#))
            .await;
        assert!(matches!(result, DispatchResult::Dropped(PayloadError::UnsupportedType(_))));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert!(h.store.is_empty().await);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.protocol.rejected_payloads, 2);
        assert_eq!(snapshot.protocol.plain_text_fallbacks, 0);
        assert_eq!(snapshot.protocol.unsupported_types, 1);
    }
}
