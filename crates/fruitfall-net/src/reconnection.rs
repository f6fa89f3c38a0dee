//! Client-side reconnection with exponential backoff.
//!
//! Identity is bound to the bearer credential, so reconnecting with the same
//! token resumes the same player. The server re-attaches that identity when it
//! rejoins its room.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;

use crate::tcp_client::{ClientError, GameClient};

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first attempt. Default: 3 s.
    pub initial_delay: Duration,
    /// Multiplier applied after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay. Default: 30 s.
    pub max_delay: Duration,
    /// Attempts before giving up. Default: 10.
    pub max_attempts: u32,
    /// Applied as ±jitter to each delay (0.0–1.0). Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.25,
        }
    }
}

/// Attempt counter and next backoff delay.
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
        }
    }

    /// Compute the next delay and advance the attempt counter.
    /// Returns `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;

        let base = self.current_delay;
        let delay = if self.config.jitter > 0.0 {
            let spread = self.config.jitter;
            base.mul_f64(rand::rng().random_range((1.0 - spread)..=(1.0 + spread)))
        } else {
            base
        };

        self.current_delay = self
            .current_delay
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);

        Some(delay.min(self.config.max_delay))
    }

    /// Start over after a successful reconnection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Errors produced by [`reconnect_loop`].
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    #[error("maximum reconnection attempts exhausted")]
    MaxAttemptsExhausted,
    /// Retrying cannot help: the server refused the credential.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

/// Reconnect to `addr` with `token`, backing off between attempts.
pub async fn reconnect_loop(
    addr: SocketAddr,
    token: &str,
    config: ReconnectConfig,
) -> Result<GameClient, ReconnectError> {
    let mut state = ReconnectState::new(config);

    while let Some(delay) = state.next_delay() {
        tracing::info!("Reconnection attempt {} in {:?}", state.attempts(), delay);
        tokio::time::sleep(delay).await;

        match GameClient::connect(addr, token).await {
            Ok(client) => {
                tracing::info!(
                    "Reconnected as {} after {} attempts",
                    client.identity(),
                    state.attempts()
                );
                return Ok(client);
            }
            Err(ClientError::Rejected(reason)) => return Err(ReconnectError::Rejected(reason)),
            Err(e) => {
                tracing::warn!("Reconnection attempt {} failed: {e}", state.attempts());
            }
        }
    }

    Err(ReconnectError::MaxAttemptsExhausted)
}
