//! Relay
//!
//! Owns one instance of every component and drives the per-connection
//! lifecycle: `Connecting -> Open -> Closed`. The transport calls
//! [`Relay::open`] when a socket is accepted, [`Relay::receive`] for every
//! inbound payload and [`Relay::close`] once the socket is gone, whether it
//! closed cleanly or failed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::metrics::RelayMetrics;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbox};
use crate::router::{DispatchResult, MessageRouter, decode};
use crate::store::{CursorSnapshot, CursorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open)
                | (Self::Connecting, Self::Closed)
                | (Self::Open, Self::Closed)
        )
    }
}

/// One connection as seen by its transport task.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    identity: String,
    state: ConnectionState,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

/// Read-only view for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub ok: bool,
    pub clients: usize,
    pub cursors: usize,
}

pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<CursorStore>,
    broadcaster: Broadcaster,
    router: MessageRouter,
    metrics: Arc<RelayMetrics>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(CursorStore::new());
        let metrics = Arc::new(RelayMetrics::new());
        let broadcaster = Broadcaster::new(registry.clone(), metrics.clone());
        let router = MessageRouter::new(store.clone(), broadcaster.clone(), metrics.clone());
        Self {
            registry,
            store,
            broadcaster,
            router,
            metrics,
        }
    }

    /// Accept a connection whose outbound messages go to `outbox`.
    ///
    /// Registers it, sends it a welcome carrying the current cursors, then
    /// tells everyone else it joined. The welcome is always the first
    /// message the connection receives. Not atomic with respect to other
    /// joins: a concurrent joiner may be missed or seen twice.
    pub async fn open(&self, outbox: Outbox) -> Session {
        let registration = self.registry.reserve(outbox).await;
        let mut session = Session {
            id: registration.id,
            identity: registration.identity,
            state: ConnectionState::Connecting,
        };
        self.metrics.connection_opened();

        let snapshot = self.store.snapshot().await;
        let cursor_count = snapshot.len();
        if let Err(e) = self
            .broadcaster
            .send_to(session.id, &ServerMessage::welcome(&session.identity, snapshot))
            .await
        {
            debug!(conn_id = %session.id, "Welcome not delivered: {}", e);
        }
        self.registry.admit(session.id).await;
        self.broadcaster
            .send_to_others(session.id, &ServerMessage::joined(&session.identity))
            .await;

        session.transition(ConnectionState::Open);
        info!(
            conn_id = %session.id,
            identity = %session.identity,
            cursors = cursor_count,
            "Connection opened"
        );
        session
    }

    /// Handle one inbound payload. Payloads arriving on a session that is
    /// not open are ignored and yield `None`.
    pub async fn receive(&self, session: &Session, raw: &str) -> Option<DispatchResult> {
        if session.state != ConnectionState::Open {
            debug!(conn_id = %session.id, state = ?session.state, "Ignoring payload on inactive session");
            return None;
        }
        self.metrics.message_received();
        let msg = decode(raw);
        Some(
            self.router
                .dispatch(session.id, &session.identity, msg)
                .await,
        )
    }

    /// Tear a connection down. Safe to call more than once: only the first
    /// call removes state and notifies peers. Returns whether it did.
    pub async fn close(&self, session: &mut Session) -> bool {
        let was_open = session.state == ConnectionState::Open;
        if !session.transition(ConnectionState::Closed) {
            return false;
        }
        if was_open {
            self.metrics.connection_closed();
        }

        let Some(identity) = self.registry.unregister(session.id).await else {
            debug!(conn_id = %session.id, "Connection already unregistered");
            return false;
        };
        self.store.remove(&identity).await;
        self.broadcaster
            .send_to_others(session.id, &ServerMessage::left(&identity))
            .await;

        info!(conn_id = %session.id, identity = %identity, "Connection closed");
        true
    }

    pub async fn status(&self) -> RelayStatus {
        RelayStatus {
            ok: true,
            clients: self.registry.count().await,
            cursors: self.store.len().await,
        }
    }

    pub async fn cursor_snapshot(&self) -> CursorSnapshot {
        self.store.snapshot().await
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<CursorStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }
}
