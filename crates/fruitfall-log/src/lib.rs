//! Structured logging for the Fruitfall server.
//!
//! Console output with uptime timestamps and module paths, plus a JSON log
//! file in debug builds. The level comes from `RUST_LOG` when set, otherwise
//! from the config's `debug.log_level`.

use fruitfall_config::Config;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directives used when neither `RUST_LOG` nor the config sets a level.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "fruitfall.log";

/// Filter directives for `config`, falling back to [`DEFAULT_DIRECTIVES`].
pub fn filter_directives(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES)
        .to_string()
}

/// Install the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - enables the file layer
/// * `config` - source of the default log level
///
/// ```no_run
/// use fruitfall_log::init_logging;
///
/// init_logging(Some(std::path::Path::new("./logs")), cfg!(debug_assertions), None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let directives = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// An `EnvFilter` built from [`DEFAULT_DIRECTIVES`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_DIRECTIVES)
}
