//! Relay hub: shared state and the per-connection protocol state machine
//!
//! The hub owns the room table, the user registry, and the invitation table
//! behind a single lock. Each room additionally guards its own membership.
//!
//! Locking rules:
//! - the hub lock may be held while taking a room lock, never the reverse;
//! - handlers drop the hub lock before delivering anything;
//! - nothing awaits while holding either lock (delivery is a non-blocking
//!   enqueue onto the target connection's writer queue).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use party_core::{Config, RelayError};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::handle::ConnectionHandle;
use crate::invitations::{Invitation, InvitationRequest, InvitationTable};
use crate::messages::{ClientMessage, Payload, ServerMessage};
use crate::rate_limiter::{TokenBucket, TokenBucketConfig};
use crate::reaper::Reaper;
use crate::registry::Registry;
use crate::room::Room;

/// Hub tuning, derived from [`Config`]
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub max_room_size: usize,
    pub rate_limit: TokenBucketConfig,
    pub sweep_interval: Duration,
    pub empty_room_max_age: Duration,
    pub room_max_age: Duration,
    pub invitation_ttl: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for HubConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_room_size: config.limits.max_room_size,
            rate_limit: TokenBucketConfig {
                capacity: config.limits.rate_burst,
                refill_per_sec: config.limits.rate_sustained,
            },
            sweep_interval: config.reaper.interval(),
            empty_room_max_age: config.reaper.empty_room_max_age(),
            room_max_age: config.reaper.room_max_age(),
            invitation_ttl: config.reaper.invitation_ttl(),
        }
    }
}

/// Per-connection protocol state
pub struct Session {
    conn: ConnectionHandle,
    room: Option<RoomBinding>,
    user_uuid: Option<String>,
    limiter: TokenBucket,
}

struct RoomBinding {
    room: Arc<Room>,
    peer_id: String,
}

impl Session {
    pub fn conn(&self) -> &ConnectionHandle {
        &self.conn
    }

    /// Session key of the bound room
    pub fn session_id(&self) -> Option<&str> {
        self.room.as_ref().map(|b| b.room.session_id())
    }

    /// Peer id within the bound room
    pub fn peer_id(&self) -> Option<&str> {
        self.room.as_ref().map(|b| b.peer_id.as_str())
    }

    /// Registered user identity
    pub fn user_uuid(&self) -> Option<&str> {
        self.user_uuid.as_deref()
    }

    fn reply(&self, msg: &ServerMessage) {
        if let Err(e) = self.conn.send(msg) {
            debug!("Reply to connection {} dropped: {}", self.conn.id(), e);
        }
    }

    fn reply_error(&self, err: &RelayError) {
        self.reply(&ServerMessage::from(err));
    }
}

/// Outcome of one reaper pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub rooms_removed: usize,
    pub invitations_expired: usize,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<String, Arc<Room>>,
    registry: Registry,
    invitations: InvitationTable,
}

/// Relay hub
pub struct RelayHub {
    config: HubConfig,
    state: RwLock<HubState>,
}

impl RelayHub {
    /// Create a hub with no background sweep
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HubState::default()),
        }
    }

    /// Create a hub and start its reaper on the current runtime.
    ///
    /// The reaper stops on its own once the last `Arc` is dropped.
    pub fn start(config: HubConfig) -> Arc<Self> {
        let hub = Arc::new(Self::new(config));
        Reaper::new(&hub).spawn();
        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Fresh per-connection state for `conn`
    pub fn open_session(&self, conn: ConnectionHandle) -> Session {
        Session {
            conn,
            room: None,
            user_uuid: None,
            limiter: TokenBucket::with_config(self.config.rate_limit),
        }
    }

    /// Handle one inbound frame.
    ///
    /// The rate limit is charged before the frame is parsed. Every failure is
    /// reported to the sender as an `error` frame; none of them end the
    /// connection.
    pub fn handle_frame(&self, session: &mut Session, frame: &[u8]) {
        if !session.limiter.allow() {
            session.reply_error(&RelayError::RateLimited);
            return;
        }

        let msg = match ClientMessage::from_json(frame) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Connection {}: bad frame: {}", session.conn.id(), e);
                session.reply_error(&RelayError::invalid(format!("Invalid message: {}", e)));
                return;
            }
        };

        if let Err(err) = self.dispatch(session, msg) {
            session.reply_error(&err);
        }
    }

    fn dispatch(&self, session: &mut Session, msg: ClientMessage) -> Result<(), RelayError> {
        match msg {
            ClientMessage::Create {
                session_id,
                peer_id,
            } => self.create_room(session, session_id, peer_id),

            ClientMessage::Join {
                session_id,
                peer_id,
            } => self.join_room(session, session_id, peer_id),

            ClientMessage::Broadcast { payload } => self.broadcast(session, payload),

            ClientMessage::SendTo { to, payload } => self.send_to(session, to, payload),

            ClientMessage::Ping => {
                session.reply(&ServerMessage::Pong);
                Ok(())
            }

            ClientMessage::Register { user_uuid } => self.register(session, user_uuid),

            ClientMessage::Invite {
                session_id,
                user_uuid,
                target_user_uuid,
                display_name,
                media_title,
                media_thumb,
            } => {
                let host = present(user_uuid)
                    .or_else(|| session.user_uuid.clone())
                    .ok_or_else(|| RelayError::invalid("userUUID required"))?;
                let (Some(session_id), Some(target)) =
                    (present(session_id), present(target_user_uuid))
                else {
                    return Err(RelayError::invalid("sessionId and targetUserUUID required"));
                };

                self.invite(
                    session,
                    InvitationRequest {
                        session_id,
                        host_user_uuid: host,
                        host_display_name: display_name,
                        target_user_uuid: target,
                        media_title,
                        media_thumb,
                    },
                )
            }

            ClientMessage::AcceptInvite {
                session_id,
                user_uuid,
                display_name,
            } => self.resolve_invite(session, session_id, user_uuid, display_name, true),

            ClientMessage::DeclineInvite {
                session_id,
                user_uuid,
                display_name,
            } => self.resolve_invite(session, session_id, user_uuid, display_name, false),

            ClientMessage::GetInvitations => {
                let user_uuid = session.user_uuid.as_deref().ok_or(RelayError::NotRegistered)?;
                let invitations = self.pending_invitations(user_uuid);
                session.reply(&ServerMessage::Invitations { invitations });
                Ok(())
            }
        }
    }

    fn create_room(
        &self,
        session: &mut Session,
        session_id: Option<String>,
        peer_id: Option<String>,
    ) -> Result<(), RelayError> {
        let (Some(session_id), Some(peer_id)) = (present(session_id), present(peer_id)) else {
            return Err(RelayError::invalid("sessionId and peerId required"));
        };
        if session.room.is_some() {
            return Err(RelayError::invalid("Already in a room"));
        }

        let room = Arc::new(Room::new(
            session_id.clone(),
            peer_id.clone(),
            session.conn.clone(),
            self.config.max_room_size,
        ));

        match self.state.write().rooms.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(RelayError::RoomExists),
            Entry::Vacant(slot) => {
                slot.insert(room.clone());
            }
        }

        info!("Room {} created by {}", session_id, peer_id);
        session.room = Some(RoomBinding { room, peer_id });
        session.reply(&ServerMessage::Created { session_id });
        Ok(())
    }

    fn join_room(
        &self,
        session: &mut Session,
        session_id: Option<String>,
        peer_id: Option<String>,
    ) -> Result<(), RelayError> {
        let (Some(session_id), Some(peer_id)) = (present(session_id), present(peer_id)) else {
            return Err(RelayError::invalid("sessionId and peerId required"));
        };
        if session.room.is_some() {
            return Err(RelayError::invalid("Already in a room"));
        }

        let room = self
            .state
            .read()
            .rooms
            .get(&session_id)
            .cloned()
            .ok_or(RelayError::RoomNotFound)?;

        let members = room.join(&peer_id, session.conn.clone())?;
        info!("Peer {} joined room {}", peer_id, session_id);

        let peers = members.into_iter().filter(|id| *id != peer_id).collect();
        session.reply(&ServerMessage::Joined {
            session_id,
            peers,
        });
        room.broadcast_except(
            &peer_id,
            &ServerMessage::PeerJoined {
                peer_id: peer_id.clone(),
            },
        );

        session.room = Some(RoomBinding { room, peer_id });
        Ok(())
    }

    fn broadcast(&self, session: &Session, payload: Option<Payload>) -> Result<(), RelayError> {
        let binding = session.room.as_ref().ok_or(RelayError::NotInRoom)?;
        binding.room.broadcast_except(
            &binding.peer_id,
            &ServerMessage::Message {
                from: binding.peer_id.clone(),
                payload,
            },
        );
        Ok(())
    }

    fn send_to(
        &self,
        session: &Session,
        to: Option<String>,
        payload: Option<Payload>,
    ) -> Result<(), RelayError> {
        let binding = session.room.as_ref().ok_or(RelayError::NotInRoom)?;
        let to = present(to).ok_or_else(|| RelayError::invalid("to field required"))?;

        binding.room.send_to(
            &to,
            &ServerMessage::Message {
                from: binding.peer_id.clone(),
                payload,
            },
        )
    }

    fn register(&self, session: &mut Session, user_uuid: Option<String>) -> Result<(), RelayError> {
        let user_uuid = present(user_uuid).ok_or_else(|| RelayError::invalid("userUUID required"))?;
        let now = Instant::now();
        let conn_id = session.conn.id();

        let (replaced, pending) = {
            let mut state = self.state.write();
            if let Some(previous) = session.user_uuid.as_deref() {
                if previous != user_uuid {
                    state.registry.unregister(previous, conn_id);
                }
            }
            let replaced = state.registry.register(user_uuid.clone(), session.conn.clone());
            let pending = state.invitations.pending(&user_uuid, now);
            (replaced, pending)
        };

        if let Some(old) = replaced.filter(|old| old.id() != conn_id) {
            // The old connection is not closed; it just stops receiving pushes.
            debug!(
                "User {} re-registered; connection {} replaced by {}",
                user_uuid,
                old.id(),
                conn_id
            );
        }
        info!("User {} registered", user_uuid);

        session.user_uuid = Some(user_uuid.clone());
        session.reply(&ServerMessage::Registered { user_uuid });
        if !pending.is_empty() {
            session.reply(&ServerMessage::Invitations {
                invitations: pending,
            });
        }
        Ok(())
    }

    fn invite(&self, session: &Session, request: InvitationRequest) -> Result<(), RelayError> {
        let now = Instant::now();

        let (invitation, target_conn) = {
            let mut state = self.state.write();
            if !state.rooms.contains_key(&request.session_id) {
                return Err(RelayError::RoomNotFound);
            }
            let invitation = Invitation::new(request, self.config.invitation_ttl, now);
            state.invitations.push(invitation.clone());
            let target_conn = state.registry.get(&invitation.target_user_uuid).cloned();
            (invitation, target_conn)
        };

        info!(
            "Invitation to room {} sent from {} to {}",
            invitation.session_id, invitation.host_user_uuid, invitation.target_user_uuid
        );
        session.reply(&ServerMessage::InviteSent {
            session_id: invitation.session_id.clone(),
            user_uuid: invitation.target_user_uuid.clone(),
        });

        if let Some(target) = target_conn {
            if let Err(e) = target.send(&ServerMessage::Invitation { invitation }) {
                debug!("Live invitation push dropped: {}", e);
            }
        }
        Ok(())
    }

    fn resolve_invite(
        &self,
        session: &Session,
        session_id: Option<String>,
        user_uuid: Option<String>,
        display_name: Option<String>,
        accepted: bool,
    ) -> Result<(), RelayError> {
        let user_uuid = present(user_uuid)
            .or_else(|| session.user_uuid.clone())
            .ok_or_else(|| RelayError::invalid("userUUID required"))?;
        let session_id = present(session_id).ok_or_else(|| RelayError::invalid("sessionId required"))?;
        let now = Instant::now();

        let hosts = {
            let mut state = self.state.write();
            let taken = state.invitations.take(&user_uuid, &session_id, now);
            if taken.is_empty() {
                return Err(RelayError::InvitationNotFound);
            }

            let host_ids: HashSet<&str> = taken.iter().map(|inv| inv.host_user_uuid.as_str()).collect();
            let hosts: Vec<ConnectionHandle> = host_ids
                .into_iter()
                .filter_map(|host| state.registry.get(host).cloned())
                .collect();
            hosts
        };

        let outcome = if accepted { "accepted" } else { "declined" };
        info!("Invitation to room {} {} by {}", session_id, outcome, user_uuid);

        let notice = if accepted {
            ServerMessage::InviteAccepted {
                session_id,
                user_uuid,
                display_name,
            }
        } else {
            ServerMessage::InviteDeclined {
                session_id,
                user_uuid,
                display_name,
            }
        };

        session.reply(&notice);
        let mut notified = HashSet::from([session.conn.id()]);
        for host in hosts {
            if !notified.insert(host.id()) {
                continue;
            }
            if let Err(e) = host.send(&notice) {
                debug!("Invitation notice to host dropped: {}", e);
            }
        }
        Ok(())
    }

    /// Release everything a closing connection holds.
    ///
    /// Leaves its room (notifying the rest with `peerLeft`) and drops its
    /// registry entry unless a newer connection has taken the identity over.
    /// Safe to call more than once.
    pub fn teardown(&self, session: &mut Session) {
        let conn_id = session.conn.id();

        if let Some(binding) = session.room.take() {
            if binding.room.leave_connection(&binding.peer_id, conn_id) {
                binding.room.broadcast_except(
                    &binding.peer_id,
                    &ServerMessage::PeerLeft {
                        peer_id: binding.peer_id.clone(),
                    },
                );
                info!("Peer {} left room {}", binding.peer_id, binding.room.session_id());
            }
        }

        if let Some(user_uuid) = session.user_uuid.take() {
            if self.state.write().registry.unregister(&user_uuid, conn_id) {
                debug!("User {} unregistered", user_uuid);
            }
        }
    }

    /// Evict stale rooms and expired invitations.
    ///
    /// A room goes when it has been empty past the grace period or has
    /// outlived the absolute maximum age. Members of an evicted room are not
    /// told; the room simply stops being findable.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut state = self.state.write();
        let mut rooms_removed = 0;

        state.rooms.retain(|id, room| {
            if !room.is_stale(now, self.config.empty_room_max_age, self.config.room_max_age) {
                return true;
            }
            info!(
                "Room {} removed (empty={}, age={}s)",
                id,
                room.is_empty(),
                room.age(now).as_secs()
            );
            rooms_removed += 1;
            false
        });

        let invitations_expired = state.invitations.sweep_expired(now);
        if invitations_expired > 0 {
            info!("{} expired invitation(s) removed", invitations_expired);
        }

        SweepReport {
            rooms_removed,
            invitations_expired,
        }
    }

    /// Unexpired invitations queued for `user_uuid`
    pub fn pending_invitations(&self, user_uuid: &str) -> Vec<Invitation> {
        self.state.read().invitations.pending(user_uuid, Instant::now())
    }

    pub fn room(&self, session_id: &str) -> Option<Arc<Room>> {
        self.state.read().rooms.get(session_id).cloned()
    }

    /// Get room count (for monitoring)
    pub fn room_count(&self) -> usize {
        self.state.read().rooms.len()
    }

    /// Get registered user count (for monitoring)
    pub fn user_count(&self) -> usize {
        self.state.read().registry.len()
    }

    /// Get queued invitation count, including not yet swept expired ones
    pub fn invitation_count(&self) -> usize {
        self.state.read().invitations.len()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Required string fields treat empty the same as absent
fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}
