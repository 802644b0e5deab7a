//! Party Relay
//!
//! WebSocket rendezvous and relay server for small groups of peers sharing a
//! session. Peers never talk to each other directly; every message passes
//! through the relay.
//!
//! # Protocol
//!
//! Clients connect to the relay path and exchange JSON text frames carrying
//! a `type` discriminator:
//!
//! 1. A host creates a room under a caller-chosen session id
//! 2. Guests join the room by session id and learn the current members
//! 3. Members broadcast to the room or address a single peer
//! 4. Users register an identity to receive invitations to rooms while online;
//!    invitations for offline users are queued until they register
//!
//! Rooms outlive their members for a short grace period and are evicted by a
//! background reaper. Nothing is persisted.

pub mod connection;
pub mod handle;
pub mod hub;
pub mod invitations;
pub mod messages;
pub mod rate_limiter;
pub mod reaper;
pub mod registry;
pub mod room;
pub mod server;

pub use connection::{run_connection, ConnectionOptions};
pub use handle::{ConnId, ConnectionHandle, SendError};
pub use hub::{HubConfig, RelayHub, Session, SweepReport};
pub use invitations::{Invitation, InvitationRequest, InvitationTable};
pub use messages::{ClientMessage, Payload, ServerMessage};
pub use rate_limiter::{TokenBucket, TokenBucketConfig};
pub use reaper::Reaper;
pub use registry::Registry;
pub use room::Room;
pub use server::RelayServer;

/// Per-connection outbound queue depth. Deliveries to a full queue are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
