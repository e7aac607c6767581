//! Connection Registry
//!
//! Owns the set of live connections, the outbox used to reach each one, and
//! the identity assigned to it. This is the only place a connection may be
//! removed from.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// Sender half of a connection's outbound queue. The transport owns the
/// receiving half and writes whatever arrives to the socket.
pub type Outbox = mpsc::Sender<String>;

/// Opaque handle for one live connection.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a successful registration.
#[derive(Clone, Debug)]
pub struct Registration {
    pub id: ConnectionId,
    pub identity: String,
}

/// Membership entry as seen by visitors.
#[derive(Clone, Debug)]
pub struct Member {
    pub id: ConnectionId,
    pub identity: String,
    pub outbox: Outbox,
}

struct Entry {
    identity: String,
    outbox: Outbox,
    connected_at: chrono::DateTime<chrono::Utc>,
    /// Reserved entries are reachable by id but hidden from fan-out.
    admitted: bool,
}

#[derive(Default)]
struct Membership {
    connections: HashMap<ConnectionId, Entry>,
    identities: HashSet<String>,
}

/// Table of live connections keyed by [`ConnectionId`].
pub struct ConnectionRegistry {
    inner: RwLock<Membership>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Membership::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection reachable through `outbox` and assign it a
    /// fresh identity that no live connection holds.
    pub async fn register(&self, outbox: Outbox) -> Registration {
        self.insert(outbox, true).await
    }

    /// Like [`register`](Self::register), but the connection stays out of
    /// [`members`](Self::members) and [`for_each`](Self::for_each) until
    /// [`admit`](Self::admit) is called. Direct sends through
    /// [`outbox`](Self::outbox) already work, so a greeting can be queued
    /// ahead of any broadcast.
    pub async fn reserve(&self, outbox: Outbox) -> Registration {
        self.insert(outbox, false).await
    }

    /// Make a reserved connection visible to fan-out. Returns false if it
    /// is no longer registered.
    pub async fn admit(&self, id: ConnectionId) -> bool {
        match self.inner.write().await.connections.get_mut(&id) {
            Some(entry) => {
                entry.admitted = true;
                true
            }
            None => false,
        }
    }

    async fn insert(&self, outbox: Outbox, admitted: bool) -> Registration {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let mut guard = self.inner.write().await;
        let identity = loop {
            let candidate = generate_identity();
            if !guard.identities.contains(&candidate) {
                break candidate;
            }
            debug!(identity = %candidate, "Identity collision, regenerating");
        };

        guard.identities.insert(identity.clone());
        guard.connections.insert(
            id,
            Entry {
                identity: identity.clone(),
                outbox,
                connected_at: chrono::Utc::now(),
                admitted,
            },
        );
        debug!(
            conn_id = %id,
            identity = %identity,
            admitted,
            connections = guard.connections.len(),
            "Connection registered"
        );

        Registration { id, identity }
    }

    /// Remove a connection. Returns the identity it held, or `None` if it
    /// was already gone; a second call for the same handle changes nothing.
    pub async fn unregister(&self, id: ConnectionId) -> Option<String> {
        let mut guard = self.inner.write().await;
        let entry = guard.connections.remove(&id)?;
        guard.identities.remove(&entry.identity);

        let lifetime = chrono::Utc::now() - entry.connected_at;
        debug!(
            conn_id = %id,
            identity = %entry.identity,
            connected_secs = lifetime.num_seconds(),
            "Connection unregistered"
        );
        Some(entry.identity)
    }

    /// Number of admitted connections.
    pub async fn count(&self) -> usize {
        self.inner
            .read()
            .await
            .connections
            .values()
            .filter(|e| e.admitted)
            .count()
    }

    #[cfg(test)]
    async fn identity_of(&self, id: ConnectionId) -> Option<String> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .map(|e| e.identity.clone())
    }

    /// Outbox for a single connection, if it is still registered.
    pub async fn outbox(&self, id: ConnectionId) -> Option<Outbox> {
        self.inner
            .read()
            .await
            .connections
            .get(&id)
            .map(|e| e.outbox.clone())
    }

    /// Point-in-time copy of the admitted members.
    pub async fn members(&self) -> Vec<Member> {
        self.inner
            .read()
            .await
            .connections
            .iter()
            .filter(|(_, e)| e.admitted)
            .map(|(id, e)| Member {
                id: *id,
                identity: e.identity.clone(),
                outbox: e.outbox.clone(),
            })
            .collect()
    }

    /// Visit every registered connection.
    ///
    /// The visitor runs over a snapshot taken before the first call, without
    /// holding the lock, so registrations and removals made concurrently
    /// (or by the visitor itself) cannot disturb the iteration.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Member),
    {
        for member in self.members().await {
            visitor(&member);
        }
    }
}

/// `user_` followed by 9 hex characters of a v4 UUID.
fn generate_identity() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("user_{}", &uuid[..9])
}
