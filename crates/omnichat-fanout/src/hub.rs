// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scope-keyed connection registry.
//!
//! Each connection is a bounded queue of serialized frames; the socket task
//! owns the receiving half. Broadcasting never awaits: a frame that cannot be
//! queued means the socket is gone or hopelessly behind, and the connection
//! is dropped from the hub.

use std::fmt;
use std::hash::Hash;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one socket within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A connected operator as reported in `users_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedUser {
    pub user_id: i64,
    pub user_type: String,
    pub connected_at: String,
}

struct Connection {
    id: ConnectionId,
    user: ConnectedUser,
    sender: mpsc::Sender<String>,
}

/// Connections grouped by scope key (chat id or tenant id).
pub struct Hub<K> {
    scope: &'static str,
    queue_size: usize,
    connections: DashMap<K, Vec<Connection>>,
}

impl<K: Eq + Hash> fmt::Debug for Hub<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("scope", &self.scope)
            .field("keys", &self.connections.len())
            .finish()
    }
}

impl<K> Hub<K>
where
    K: Eq + Hash + Copy + fmt::Display,
{
    pub fn new(scope: &'static str, queue_size: usize) -> Self {
        Self {
            scope,
            queue_size: queue_size.max(1),
            connections: DashMap::new(),
        }
    }

    /// Register an operator socket. The receiver yields serialized frames
    /// in broadcast order.
    pub fn connect(&self, key: K, user_id: i64) -> (ConnectionId, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(self.queue_size);
        let id = ConnectionId::new();
        let connection = Connection {
            id,
            user: ConnectedUser {
                user_id,
                user_type: "OPERATOR".to_string(),
                connected_at: omnichat_core::time::now(),
            },
            sender,
        };
        self.connections.entry(key).or_default().push(connection);
        debug!(scope = self.scope, %key, %id, user_id, "connection registered");
        (id, receiver)
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn disconnect(&self, key: K, id: ConnectionId) -> bool {
        let removed = match self.connections.get_mut(&key) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|c| c.id != id);
                entry.len() != before
            }
            None => false,
        };
        self.connections.remove_if(&key, |_, conns| conns.is_empty());
        if removed {
            debug!(scope = self.scope, %key, %id, "connection removed");
        }
        removed
    }

    /// Queue a frame for every connection under `key`. Dead or saturated
    /// connections are dropped. Returns the number of connections reached.
    pub fn broadcast<T: Serialize + ?Sized>(&self, key: K, frame: &T) -> usize {
        let Some(text) = encode(frame) else {
            return 0;
        };
        let delivered = match self.connections.get_mut(&key) {
            Some(mut entry) => {
                let mut delivered = 0;
                entry.retain(|c| {
                    let kept = self.offer(c, text.clone());
                    if kept {
                        delivered += 1;
                    }
                    kept
                });
                delivered
            }
            None => 0,
        };
        self.connections.remove_if(&key, |_, conns| conns.is_empty());
        delivered
    }

    /// Queue a frame for one connection only.
    pub fn send_to<T: Serialize + ?Sized>(&self, key: K, id: ConnectionId, frame: &T) -> bool {
        let Some(text) = encode(frame) else {
            return false;
        };
        let kept = match self.connections.get_mut(&key) {
            Some(mut entry) => match entry.iter().position(|c| c.id == id) {
                Some(index) => {
                    let kept = self.offer(&entry[index], text);
                    if !kept {
                        entry.remove(index);
                    }
                    kept
                }
                None => false,
            },
            None => false,
        };
        self.connections.remove_if(&key, |_, conns| conns.is_empty());
        kept
    }

    fn offer(&self, connection: &Connection, text: String) -> bool {
        match connection.sender.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => {
                debug!(scope = self.scope, id = %connection.id, "dropping closed connection");
                false
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    scope = self.scope,
                    id = %connection.id,
                    user_id = connection.user.user_id,
                    "connection queue full; dropping slow consumer"
                );
                false
            }
        }
    }

    pub fn users(&self, key: K) -> Vec<ConnectedUser> {
        self.connections
            .get(&key)
            .map(|conns| conns.iter().map(|c| c.user.clone()).collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, key: K) -> usize {
        self.connections.get(&key).map_or(0, |conns| conns.len())
    }

    /// Connections across all keys.
    pub fn total(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }
}

fn encode<T: Serialize + ?Sized>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "failed to encode frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_connection_in_order() {
        let hub: Hub<i64> = Hub::new("chat", 8);
        let (_a, mut rx_a) = hub.connect(1, 10);
        let (_b, mut rx_b) = hub.connect(1, 11);
        let (_c, mut rx_c) = hub.connect(2, 12);

        assert_eq!(hub.broadcast(1, &json!({"n": 1})), 2);
        assert_eq!(hub.broadcast(1, &json!({"n": 2})), 2);

        assert_eq!(rx_a.recv().await.unwrap(), r#"{"n":1}"#);
        assert_eq!(rx_a.recv().await.unwrap(), r#"{"n":2}"#);
        assert_eq!(rx_b.recv().await.unwrap(), r#"{"n":1}"#);
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn closed_connection_is_dropped_on_send() {
        let hub: Hub<i64> = Hub::new("chat", 8);
        let (_a, rx_a) = hub.connect(1, 10);
        let (_b, _rx_b) = hub.connect(1, 11);
        drop(rx_a);

        assert_eq!(hub.broadcast(1, &json!({})), 1);
        assert_eq!(hub.connection_count(1), 1);
        assert_eq!(hub.users(1)[0].user_id, 11);
    }

    #[test]
    fn full_queue_drops_slow_consumer() {
        let hub: Hub<i64> = Hub::new("tenant", 1);
        let (_a, _rx) = hub.connect(5, 10);
        assert_eq!(hub.broadcast(5, &json!({"n": 1})), 1);
        assert_eq!(hub.broadcast(5, &json!({"n": 2})), 0);
        assert_eq!(hub.total(), 0);
    }

    #[test]
    fn debug_shows_scope_and_key_count() {
        let hub: Hub<i64> = Hub::new("tenant", 2);
        let (_id, _rx) = hub.connect(9, 1);
        let rendered = format!("{hub:?}");
        assert!(rendered.contains("tenant"));
        assert!(rendered.contains("keys: 1"));
    }

    #[test]
    fn disconnect_removes_empty_keys() {
        let hub: Hub<i64> = Hub::new("chat", 4);
        let (id, _rx) = hub.connect(3, 1);
        assert!(hub.disconnect(3, id));
        assert!(!hub.disconnect(3, id));
        assert_eq!(hub.connection_count(3), 0);
        assert_eq!(hub.broadcast(3, &json!({})), 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let hub: Hub<i64> = Hub::new("chat", 4);
        let (a, mut rx_a) = hub.connect(1, 10);
        let (_b, mut rx_b) = hub.connect(1, 11);
        assert!(hub.send_to(1, a, &json!({"only": "a"})));
        assert_eq!(rx_a.recv().await.unwrap(), r#"{"only":"a"}"#);
        assert!(rx_b.try_recv().is_err());
    }
}
