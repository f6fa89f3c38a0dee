//! Fruitfall match server.
//!
//! Loads `config.ron` (creating it on first run), applies CLI overrides, and
//! serves rooms until Ctrl-C.
//!
//! Run with: `cargo run -p fruitfall-server -- --port 7878`

mod bootstrap;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fruitfall_config::{CliArgs, Config, default_config_dir};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);

    fruitfall_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );
    info!("Fruitfall server, config at {}", config_dir.display());

    let server = match bootstrap::build_server(&config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutdown requested");
        signal_server.shutdown();
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}
