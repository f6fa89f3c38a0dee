//! Per-sender rate limiting for board snapshots.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use fruitfall_net::PlayerId;

/// Admits at most one unforced snapshot per `interval` per sender.
#[derive(Debug)]
pub struct StateThrottle {
    interval: Duration,
    last_accepted: HashMap<PlayerId, Instant>,
}

impl StateThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a snapshot from `sender` arriving at `now` should be relayed.
    /// Forced snapshots always pass and restart the window.
    pub fn allow(&mut self, sender: &PlayerId, forced: bool, now: Instant) -> bool {
        if !forced {
            if let Some(last) = self.last_accepted.get(sender) {
                if now.saturating_duration_since(*last) < self.interval {
                    return false;
                }
            }
        }
        self.last_accepted.insert(sender.clone(), now);
        true
    }

    pub fn forget(&mut self, sender: &PlayerId) {
        self.last_accepted.remove(sender);
    }

    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}
