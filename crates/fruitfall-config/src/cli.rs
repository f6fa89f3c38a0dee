//! Command-line arguments for the Fruitfall server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Fruitfall server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "fruitfall-server", about = "Fruitfall 1v1 match server")]
pub struct CliArgs {
    /// IP address to bind.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.network.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from(["fruitfall-server", "--port", "9001", "--log-level", "debug"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.port, 9001);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.network.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_dir_flag() {
        let args = CliArgs::parse_from(["fruitfall-server", "--config", "/tmp/ff"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/ff")));
    }
}
