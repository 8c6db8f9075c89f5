//! Connection registry: tracks all active WebSocket connections per user.
//!
//! A user can have multiple concurrent connections (multiple devices/tabs).
//! Rooms never hold connection references; they key members by user id and
//! resolve connections through this registry at send time, so a reaped
//! connection cannot dangle from a room iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::session::Role;
use crate::ws::ConnectionSender;

/// One live transport-level channel to an authenticated identity.
#[derive(Debug)]
pub struct Connection {
    /// Stable handle, unique per connection for the process lifetime
    pub id: Uuid,
    /// Owning user
    pub user_id: String,
    pub role: Role,
    /// Sender half of the writer task's channel
    pub sender: ConnectionSender,
    /// Liveness flag: cleared before each sweep probe, set again on pong
    alive: AtomicBool,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(user_id: String, role: Role, sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            role,
            sender,
            alive: AtomicBool::new(true),
            connected_at: Utc::now(),
        }
    }

    /// Record that the client answered the latest liveness probe.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clear the liveness flag, returning whether it was set. A connection
    /// that stays cleared until the next sweep cycle missed a full period.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Whether the writer task is still consuming frames.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Process-wide map from user id to that user's live connections.
///
/// Invariant: a user id key exists only while its connection set is
/// non-empty; the entry is removed eagerly on last-connection close.
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id.clone();
        let mut entry = self.connections.entry(user_id).or_default();
        entry.push(conn.clone());
        tracing::debug!(
            user_id = %conn.user_id,
            connections = entry.len(),
            "connection registered"
        );
    }

    /// Remove one connection from its user's set. Returns true when this was
    /// the user's last connection and the user entry was dropped, which is
    /// the signal for the room-membership cleanup path.
    pub fn deregister(&self, user_id: &str, connection_id: Uuid) -> bool {
        let mut emptied = false;
        if let Some(mut entry) = self.connections.get_mut(user_id) {
            entry.retain(|c| c.id != connection_id);
            emptied = entry.is_empty();
        }
        if emptied {
            return self
                .connections
                .remove_if(user_id, |_, conns| conns.is_empty())
                .is_some();
        }
        false
    }

    /// Cloned snapshot of a user's connections, safe to iterate while
    /// concurrent register/deregister calls mutate the registry.
    pub fn connections_of(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|entry| !entry.value().is_empty())
            .unwrap_or(false)
    }

    /// Cloned view of every user's connection set, for the liveness sweep.
    pub fn snapshot(&self) -> Vec<(String, Vec<Arc<Connection>>)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn user_count(&self) -> usize {
        self.connections.len()
    }

    /// Service-stop teardown: close every live connection and drop all state.
    pub fn close_all(&self, reason: &str) {
        for entry in self.connections.iter() {
            for conn in entry.value() {
                let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: reason.to_string().into(),
                })));
            }
        }
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
