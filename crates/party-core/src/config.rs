//! Configuration system for Party Relay
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/party-relay/config.toml
//! - Linux: ~/.config/party-relay/config.toml
//! - Windows: %APPDATA%/party-relay/config.toml
//!
//! Every section is `#[serde(default)]`, so a partial file only overrides
//! the keys it names.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Room size, rate limiting, and frame size limits
    pub limits: LimitsConfig,
    /// Connection liveness timing
    pub timeouts: TimeoutConfig,
    /// Background sweep timing
    pub reaper: ReaperConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: IpAddr,
    /// Listen port
    pub port: u16,
    /// Path upgraded to the relay WebSocket
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::DEFAULT_PORT,
            path: crate::RELAY_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// Socket address to listen on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Per-room and per-connection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum peers per room
    pub max_room_size: usize,
    /// Token bucket burst size
    pub rate_burst: u32,
    /// Token bucket refill rate per second
    pub rate_sustained: u32,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_room_size: crate::MAX_ROOM_SIZE,
            rate_burst: crate::RATE_BURST,
            rate_sustained: crate::RATE_SUSTAINED,
            max_message_size: crate::MAX_MESSAGE_SIZE,
        }
    }
}

/// Connection liveness timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each outbound write in seconds
    pub write_wait_secs: u64,
    /// Read deadline in seconds, refreshed by pongs
    pub pong_wait_secs: u64,
    /// Ping interval in seconds (should be below pong_wait_secs)
    pub ping_interval_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: crate::WRITE_WAIT_SECS,
            pong_wait_secs: crate::PONG_WAIT_SECS,
            ping_interval_secs: crate::PING_INTERVAL_SECS,
        }
    }
}

impl TimeoutConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Reaper timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Empty rooms older than this are removed
    pub empty_room_max_age_secs: u64,
    /// Any room older than this is removed
    pub room_max_age_secs: u64,
    /// Lifetime of a queued invitation
    pub invitation_ttl_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: crate::CLEANUP_INTERVAL_SECS,
            empty_room_max_age_secs: crate::EMPTY_ROOM_MAX_AGE_SECS,
            room_max_age_secs: crate::ROOM_MAX_AGE_SECS,
            invitation_ttl_secs: crate::INVITATION_TTL_SECS,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn empty_room_max_age(&self) -> Duration {
        Duration::from_secs(self.empty_room_max_age_secs)
    }

    pub fn room_max_age(&self) -> Duration {
        Duration::from_secs(self.room_max_age_secs)
    }

    pub fn invitation_ttl(&self) -> Duration {
        Duration::from_secs(self.invitation_ttl_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("app", "party", "party-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        Self::default().to_toml().unwrap_or_default()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
