//! Relay metrics for observability
//!
//! Counters are updated from every connection task, so they are plain
//! atomics with relaxed ordering.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since relay start
    pub total_connections: AtomicU64,

    // Message metrics
    /// Inbound payloads received from clients
    pub messages_received: AtomicU64,
    /// Outbound messages queued to a connection's outbox
    pub messages_sent: AtomicU64,
    /// Outbound messages dropped because the outbox was full
    pub messages_dropped: AtomicU64,
    /// Outbound messages addressed to an outbox that was already closed
    pub messages_undeliverable: AtomicU64,

    // Protocol metrics
    /// Unstructured payloads relayed as chat text
    pub plain_text_fallbacks: AtomicU64,
    /// Payloads of a known type with unusable data
    pub rejected_payloads: AtomicU64,
    /// Payloads with a type clients may not send
    pub unsupported_types: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_undeliverable(&self) {
        self.messages_undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn plain_text_fallback(&self) {
        self.plain_text_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payload_rejected(&self) {
        self.rejected_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unsupported_type(&self) {
        self.unsupported_types.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                undeliverable: self.messages_undeliverable.load(Ordering::Relaxed),
            },
            protocol: ProtocolMetrics {
                plain_text_fallbacks: self.plain_text_fallbacks.load(Ordering::Relaxed),
                rejected_payloads: self.rejected_payloads.load(Ordering::Relaxed),
                unsupported_types: self.unsupported_types.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub protocol: ProtocolMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub undeliverable: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMetrics {
    pub plain_text_fallbacks: u64,
    pub rejected_payloads: u64,
    pub unsupported_types: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = RelayMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot() {
        let metrics = RelayMetrics::new();
        metrics.connection_opened();
        metrics.message_received();
        metrics.message_sent();
        metrics.message_sent();
        metrics.message_dropped();
        metrics.plain_text_fallback();
        metrics.unsupported_type();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections.active, 1);
        assert_eq!(snapshot.messages.received, 1);
        assert_eq!(snapshot.messages.sent, 2);
        assert_eq!(snapshot.messages.dropped, 1);
        assert_eq!(snapshot.protocol.plain_text_fallbacks, 1);
        assert_eq!(snapshot.protocol.unsupported_types, 1);
        assert_eq!(snapshot.protocol.rejected_payloads, 0);
    }
}
