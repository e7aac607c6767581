//! Broadcaster
//!
//! Fire-and-forget delivery of server messages to one, many or all
//! connections. Messages are serialized once per call and pushed into each
//! destination's outbox with `try_send`, so a slow peer never blocks the
//! caller: when its outbox is full the message is dropped for that peer only.

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::error::DeliveryError;
use crate::metrics::RelayMetrics;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbox};

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Deliver to exactly one connection. An unknown or closed connection
    /// is reported but nothing is queued or retried.
    pub async fn send_to(&self, id: ConnectionId, msg: &ServerMessage) -> Result<(), DeliveryError> {
        let outbox = self
            .registry
            .outbox(id)
            .await
            .ok_or(DeliveryError::UnknownConnection(id))?;
        let json = encode(msg)?;
        self.deliver(id, &outbox, json)
    }

    /// Deliver to every registered connection except `sender`.
    /// Returns the number of outboxes that accepted the message.
    pub async fn send_to_others(&self, sender: ConnectionId, msg: &ServerMessage) -> usize {
        self.fan_out(msg, Some(sender)).await
    }

    /// Deliver to every registered connection.
    /// Returns the number of outboxes that accepted the message.
    pub async fn send_to_all(&self, msg: &ServerMessage) -> usize {
        self.fan_out(msg, None).await
    }

    async fn fan_out(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let json = match encode(msg) {
            Ok(j) => j,
            Err(e) => {
                error!(msg_type = %msg.message_type(), "{}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        self.registry
            .for_each(|member| {
                if Some(member.id) == exclude {
                    return;
                }
                // A failed destination never stops the rest of the fan-out.
                if self.deliver(member.id, &member.outbox, json.clone()).is_ok() {
                    delivered += 1;
                }
            })
            .await;

        debug!(
            msg_type = %msg.message_type(),
            user_id = %msg.user_id(),
            delivered,
            "Broadcast complete"
        );
        delivered
    }

    fn deliver(&self, id: ConnectionId, outbox: &Outbox, json: String) -> Result<(), DeliveryError> {
        match outbox.try_send(json) {
            Ok(()) => {
                self.metrics.message_sent();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.message_dropped();
                warn!(conn_id = %id, "Outbox full, dropping message");
                Err(DeliveryError::Backpressure(id))
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.message_undeliverable();
                debug!(conn_id = %id, "Outbox closed, message not delivered");
                Err(DeliveryError::Closed(id))
            }
        }
    }
}

fn encode(msg: &ServerMessage) -> Result<String, DeliveryError> {
    serde_json::to_string(msg).map_err(|e| DeliveryError::Serialize(e.to_string()))
}
