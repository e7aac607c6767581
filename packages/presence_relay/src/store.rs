//! Shared-State Store
//!
//! Latest known cursor per identity. Entries appear on the first cursor
//! update and vanish when the connection goes away.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use tokio::sync::RwLock;

/// Colors handed out to cursors, one per identity.
pub const CURSOR_PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// Ephemeral cursor state for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Unix epoch milliseconds of the last update.
    #[serde(rename = "lastSeen")]
    pub last_seen: i64,
}

/// Point-in-time copy of every known cursor.
pub type CursorSnapshot = HashMap<String, Cursor>;

#[derive(Default)]
pub struct CursorStore {
    cursors: RwLock<HashMap<String, Cursor>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all cursors; mutating it does not touch the store.
    pub async fn snapshot(&self) -> CursorSnapshot {
        self.cursors.read().await.clone()
    }

    /// Record a new position. The color is picked on first insert and kept
    /// for as long as the entry lives.
    pub async fn upsert(&self, identity: &str, x: f64, y: f64) -> Cursor {
        let now = chrono::Utc::now().timestamp_millis();
        let mut guard = self.cursors.write().await;
        let cursor = guard
            .entry(identity.to_string())
            .and_modify(|c| {
                c.x = x;
                c.y = y;
                c.last_seen = now;
            })
            .or_insert_with(|| Cursor {
                color: palette_color(identity).to_string(),
                x,
                y,
                last_seen: now,
            });
        cursor.clone()
    }

    pub async fn remove(&self, identity: &str) -> Option<Cursor> {
        self.cursors.write().await.remove(identity)
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, identity: &str) -> Option<Cursor> {
        self.cursors.read().await.get(identity).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cursors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cursors.read().await.is_empty()
    }
}

/// Palette entry for an identity: hash of the identity modulo palette size.
pub fn palette_color(identity: &str) -> &'static str {
    let mut hasher = DefaultHasher::new();
    identity.hash(&mut hasher);
    CURSOR_PALETTE[(hasher.finish() % CURSOR_PALETTE.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_preserves_color() {
        let store = CursorStore::new();
        let first = store.upsert("user_a", 1.0, 2.0).await;
        let second = store.upsert("user_a", 30.0, 40.0).await;

        assert_eq!(first.color, second.color);
        assert_eq!(second.x, 30.0);
        assert_eq!(second.y, 40.0);
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_then_snapshot_excludes_identity() {
        let store = CursorStore::new();
        store.upsert("user_a", 1.0, 2.0).await;
        store.upsert("user_b", 3.0, 4.0).await;

        assert!(store.remove("user_a").await.is_some());
        assert!(store.remove("user_a").await.is_none());

        let snapshot = store.snapshot().await;
        assert!(!snapshot.contains_key("user_a"));
        assert!(snapshot.contains_key("user_b"));
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let store = CursorStore::new();
        store.upsert("user_a", 1.0, 2.0).await;

        let mut snapshot = store.snapshot().await;
        snapshot.clear();
        snapshot.insert(
            "intruder".into(),
            Cursor {
                color: "#000000".into(),
                x: 0.0,
                y: 0.0,
                last_seen: 0,
            },
        );

        assert_eq!(store.len().await, 1);
        assert!(store.get("intruder").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_then_upsert_is_fresh_insert() {
        let store = CursorStore::new();
        store.upsert("user_a", 5.0, 5.0).await;
        store.remove("user_a").await;

        let cursor = store.upsert("user_a", 9.0, 9.0).await;
        assert_eq!(cursor.x, 9.0);
        assert_eq!(cursor.color, palette_color("user_a"));
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_palette_color_is_deterministic() {
        assert_eq!(palette_color("user_abc"), palette_color("user_abc"));
        assert!(CURSOR_PALETTE.contains(&palette_color("user_abc")));
    }

    #[test]
    fn test_cursor_serializes_last_seen_camel_case() {
        let cursor = Cursor {
            color: "#FF6B6B".into(),
            x: 10.0,
            y: 20.0,
            last_seen: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json["lastSeen"], 1_700_000_000_000i64);
        assert_eq!(json["x"], 10.0);
    }
}
