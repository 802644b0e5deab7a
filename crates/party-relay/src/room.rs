//! Room management for the relay
//!
//! A room is a capacity-bounded set of peers keyed by caller-chosen peer ids.
//! Membership lives behind the room's own lock so that fan-out in one room
//! never contends with lookups of other rooms in the hub's table.
//!
//! Lock order: a caller may hold the hub lock while taking a room lock, never
//! the other way around.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use party_core::RelayError;
use tokio::time::Instant;
use tracing::debug;

use crate::handle::{ConnId, ConnectionHandle};
use crate::messages::ServerMessage;

/// A room where peers relay messages to each other
pub struct Room {
    session_id: String,
    host_peer_id: String,
    capacity: usize,
    created_at: Instant,
    peers: RwLock<HashMap<String, ConnectionHandle>>,
}

impl Room {
    /// Create a room with its host as the first member
    pub fn new(
        session_id: impl Into<String>,
        host_peer_id: impl Into<String>,
        host: ConnectionHandle,
        capacity: usize,
    ) -> Self {
        let host_peer_id = host_peer_id.into();
        let mut peers = HashMap::with_capacity(capacity);
        peers.insert(host_peer_id.clone(), host);

        Self {
            session_id: session_id.into(),
            host_peer_id,
            capacity,
            created_at: Instant::now(),
            peers: RwLock::new(peers),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn host_peer_id(&self) -> &str {
        &self.host_peer_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a peer.
    ///
    /// Returns every member id after the join, the joiner included.
    /// Re-using a peer id that is already present replaces its connection.
    pub fn join(&self, peer_id: &str, conn: ConnectionHandle) -> Result<Vec<String>, RelayError> {
        let mut peers = self.peers.write();
        if peers.len() >= self.capacity {
            return Err(RelayError::RoomFull);
        }
        peers.insert(peer_id.to_string(), conn);
        Ok(sorted_ids(&peers))
    }

    /// Remove a peer. No-op if absent.
    pub fn leave(&self, peer_id: &str) -> bool {
        self.peers.write().remove(peer_id).is_some()
    }

    /// Remove a peer only if it is still bound to the given connection.
    ///
    /// A later join under the same peer id is left alone.
    pub fn leave_connection(&self, peer_id: &str, conn_id: ConnId) -> bool {
        let mut peers = self.peers.write();
        match peers.get(peer_id) {
            Some(conn) if conn.id() == conn_id => {
                peers.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    /// Deliver to every member except `sender_id`.
    ///
    /// Serializes once. A failed delivery to one peer does not stop delivery
    /// to the rest. Returns the number of peers the frame was queued for.
    pub fn broadcast_except(&self, sender_id: &str, msg: &ServerMessage) -> usize {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                debug!("Room {}: dropping unencodable broadcast: {}", self.session_id, e);
                return 0;
            }
        };

        let peers = self.peers.read();
        let mut delivered = 0;
        for (id, conn) in peers.iter() {
            if id == sender_id {
                continue;
            }
            match conn.send_text(json.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Room {}: delivery to {} failed: {}", self.session_id, id, e),
            }
        }
        delivered
    }

    /// Deliver to a single member
    pub fn send_to(&self, target_id: &str, msg: &ServerMessage) -> Result<(), RelayError> {
        let peers = self.peers.read();
        let conn = peers.get(target_id).ok_or(RelayError::PeerNotFound)?;

        if let Err(e) = conn.send(msg) {
            debug!("Room {}: delivery to {} failed: {}", self.session_id, target_id, e);
        }
        Ok(())
    }

    /// Member ids, sorted
    pub fn peer_ids(&self) -> Vec<String> {
        sorted_ids(&self.peers.read())
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Time since creation
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Whether the reaper should evict this room.
    ///
    /// Empty rooms get a grace period; every room has an absolute lifetime.
    pub fn is_stale(&self, now: Instant, empty_grace: Duration, max_age: Duration) -> bool {
        let age = self.age(now);
        (self.is_empty() && age > empty_grace) || age > max_age
    }
}

fn sorted_ids(peers: &HashMap<String, ConnectionHandle>) -> Vec<String> {
    let mut ids: Vec<String> = peers.keys().cloned().collect();
    ids.sort();
    ids
}
