//! # Configuration
//!
//! TOML-backed settings for the server and the headless client. Every key is
//! optional; missing keys keep their defaults.
//!
//! ```toml
//! bind_address = "0.0.0.0:4433"
//! movement_tick_hz = 60
//! map_path = "assets/lava.map"
//!
//! [persistence]
//! queue_capacity = 1024
//! snapshot_ttl_secs = 300
//!
//! [world]
//! sprint_speed = 60.0
//! ```

use crate::error::ConfigError;
use cinder_core::WorldConfig;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default server port.
pub const DEFAULT_PORT: u16 = 4433;

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn require_nonzero(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
    }
    Ok(())
}

/// Write-behind persistence settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshots held before new ones are dropped.
    pub queue_capacity: usize,
    /// Snapshots written per writer wake-up.
    pub max_batch_size: usize,
    /// How long the writer sleeps when the queue is empty (ms).
    pub idle_wait_ms: u64,
    /// Delay before a disconnected entity's snapshot expires (s).
    pub snapshot_ttl_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_batch_size: 64,
            idle_wait_ms: 50,
            snapshot_ttl_secs: 300,
        }
    }
}

impl PersistenceConfig {
    /// Snapshot expiry delay.
    #[must_use]
    pub const fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Writer idle wait.
    #[must_use]
    pub const fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Movement tick rate (updates per second).
    pub movement_tick_hz: u32,
    /// Hazard tick period (ms).
    pub hazard_interval_ms: u64,
    /// Silence after which a session is evicted (ms).
    pub heartbeat_timeout_ms: u64,
    /// Period of the liveness sweep (ms).
    pub heartbeat_sweep_ms: u64,
    /// Maximum number of concurrent sessions.
    pub max_clients: usize,
    /// Outbound command channel capacity.
    pub command_capacity: usize,
    /// Frames buffered per connection before the transport drops it.
    pub outbound_capacity: usize,
    /// Write-behind settings.
    pub persistence: PersistenceConfig,
    /// Text tile map. No map means every tile is walkable.
    pub map_path: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Shared simulation constants.
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            movement_tick_hz: crate::MOVEMENT_TICK_RATE,
            hazard_interval_ms: 500,
            heartbeat_timeout_ms: 7_000,
            heartbeat_sweep_ms: 2_000,
            max_clients: crate::MAX_CLIENTS,
            command_capacity: 10_000,
            outbound_capacity: 256,
            persistence: PersistenceConfig::default(),
            map_path: None,
            log_level: "info".to_string(),
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// I/O, syntax, or [`ConfigError::Invalid`] for zero periods and capacities.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall or spin the server.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_nonzero("movement_tick_hz", u64::from(self.movement_tick_hz))?;
        require_nonzero("hazard_interval_ms", self.hazard_interval_ms)?;
        require_nonzero("heartbeat_timeout_ms", self.heartbeat_timeout_ms)?;
        require_nonzero("heartbeat_sweep_ms", self.heartbeat_sweep_ms)?;
        require_nonzero("max_clients", self.max_clients as u64)?;
        require_nonzero("command_capacity", self.command_capacity as u64)?;
        require_nonzero("outbound_capacity", self.outbound_capacity as u64)?;
        require_nonzero("persistence.queue_capacity", self.persistence.queue_capacity as u64)?;
        require_nonzero("persistence.max_batch_size", self.persistence.max_batch_size as u64)?;
        Ok(())
    }

    /// Movement tick period.
    #[must_use]
    pub fn movement_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.movement_tick_hz.max(1)))
    }

    /// Hazard tick period.
    #[must_use]
    pub const fn hazard_period(&self) -> Duration {
        Duration::from_millis(self.hazard_interval_ms)
    }

    /// Heartbeat timeout.
    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Liveness sweep period.
    #[must_use]
    pub const fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_sweep_ms)
    }
}

/// Headless client configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server to connect to.
    pub server_address: SocketAddr,
    /// Heartbeat period (ms).
    pub ping_interval_ms: u64,
    /// Silence after which the server counts as lost (ms).
    pub server_timeout_ms: u64,
    /// Minimum spacing between intents (ms).
    pub input_interval_ms: u64,
    /// Local hazard prediction period (ms).
    pub hazard_interval_ms: u64,
    /// Shared simulation constants. Must match the server.
    pub world: WorldConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            ping_interval_ms: 2_000,
            server_timeout_ms: 6_000,
            input_interval_ms: 33,
            hazard_interval_ms: 500,
            world: WorldConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// I/O, syntax, or [`ConfigError::Invalid`] for zero periods.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_toml(path.as_ref())?;
        require_nonzero("ping_interval_ms", config.ping_interval_ms)?;
        require_nonzero("server_timeout_ms", config.server_timeout_ms)?;
        require_nonzero("input_interval_ms", config.input_interval_ms)?;
        require_nonzero("hazard_interval_ms", config.hazard_interval_ms)?;
        Ok(config)
    }

    /// Heartbeat period.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Server silence timeout.
    #[must_use]
    pub const fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    /// Intent spacing.
    #[must_use]
    pub const fn input_interval(&self) -> Duration {
        Duration::from_millis(self.input_interval_ms)
    }

    /// Hazard prediction period.
    #[must_use]
    pub const fn hazard_interval(&self) -> Duration {
        Duration::from_millis(self.hazard_interval_ms)
    }
}
