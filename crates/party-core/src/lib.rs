//! Party Core - Shared constants, error vocabulary, and configuration
//!
//! This crate contains the pieces of the relay that have no dependency on
//! networking: the wire error codes, the typed errors the hub raises, and the
//! TOML configuration loaded at startup.

pub mod config;
pub mod error;

pub use config::{Config, ConfigError, LimitsConfig, ReaperConfig, ServerConfig, TimeoutConfig};
pub use error::{ErrorCode, RelayError};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Path that is upgraded to a WebSocket relay connection
pub const RELAY_PATH: &str = "/relay";

/// Maximum peers per room
pub const MAX_ROOM_SIZE: usize = 8;

/// Token bucket burst capacity per connection
pub const RATE_BURST: u32 = 30;

/// Token bucket sustained refill rate (tokens per second)
pub const RATE_SUSTAINED: u32 = 10;

/// Maximum inbound message size (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Deadline for a single outbound write (seconds)
pub const WRITE_WAIT_SECS: u64 = 10;

/// Read deadline, refreshed on every pong (seconds)
pub const PONG_WAIT_SECS: u64 = 60;

/// Interval between outbound pings (seconds)
pub const PING_INTERVAL_SECS: u64 = 30;

/// Reaper sweep interval (5 minutes)
pub const CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

/// Grace period before an empty room is reaped (5 minutes)
pub const EMPTY_ROOM_MAX_AGE_SECS: u64 = 5 * 60;

/// Absolute room lifetime regardless of occupancy (24 hours)
pub const ROOM_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Lifetime of a queued invitation (1 hour)
pub const INVITATION_TTL_SECS: u64 = 60 * 60;
