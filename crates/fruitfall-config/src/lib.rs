//! Fruitfall server configuration.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AuthConfig, Config, DebugConfig, GameConfig, ModeSetting, NetworkConfig, TokenEntry,
    default_config_dir,
};
pub use error::ConfigError;
