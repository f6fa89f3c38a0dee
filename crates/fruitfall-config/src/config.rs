//! Configuration structs with defaults and RON persistence.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and per-connection limits.
    pub network: NetworkConfig,
    /// Match rules.
    pub game: GameConfig,
    /// Accepted bearer tokens.
    pub auth: AuthConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// IP address to bind.
    pub bind_address: String,
    pub port: u16,
    /// Maximum concurrent authenticated connections.
    pub max_connections: usize,
    /// Seconds a new connection has to send `hello`.
    pub handshake_timeout_secs: u64,
    /// Outbound messages buffered per connection before drops.
    pub outbound_queue: usize,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: u32,
}

/// Mode used for rooms created without one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModeSetting {
    /// Limit is a number of drops per player.
    Moves,
    /// Limit is a number of seconds.
    Time,
}

/// Match configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Minimum spacing between relayed board snapshots per player.
    pub state_throttle_ms: u64,
    pub default_mode: ModeSetting,
    pub default_limit: u32,
}

/// One accepted token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenEntry {
    /// Stable player identity the token resolves to.
    pub identity: String,
    /// Display name shown to other players.
    pub name: String,
}

/// Static token table (token -> player).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, TokenEntry>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7878,
            max_connections: 256,
            handshake_timeout_secs: 5,
            outbound_queue: 256,
            max_frame_bytes: 1_048_576,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            state_throttle_ms: 100,
            default_mode: ModeSetting::Moves,
            default_limit: 50,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl GameConfig {
    pub fn state_throttle(&self) -> Duration {
        Duration::from_millis(self.state_throttle_ms)
    }
}

/// Platform config directory for the server, e.g. `~/.config/fruitfall`.
/// Falls back to the working directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("fruitfall"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-read the file: `Some(new_config)` if it changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
