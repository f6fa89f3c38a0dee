//! Durable room records.
//!
//! The store originates a room's identity at creation time. It is not kept in
//! sync with live membership, which lives only in the registry.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use fruitfall_net::{GameMode, RoomId};

/// Persisted description of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    pub has_password: bool,
    pub game_mode: GameMode,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence back end for room records.
pub trait RoomStore: Send + Sync {
    /// Persist a new room and return its record with a fresh id.
    fn create(
        &self,
        name: &str,
        has_password: bool,
        game_mode: GameMode,
    ) -> Result<RoomRecord, StoreError>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryRoomStore {
    records: Mutex<HashMap<RoomId, RoomRecord>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RoomStore for MemoryRoomStore {
    fn create(
        &self,
        name: &str,
        has_password: bool,
        game_mode: GameMode,
    ) -> Result<RoomRecord, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rng = rand::rng();
        let id = loop {
            let candidate = RoomId(format!("room-{:012x}", rng.random::<u64>() >> 16));
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };

        let record = RoomRecord {
            id: id.clone(),
            name: name.to_string(),
            has_password,
            game_mode,
            created_at: unix_millis(),
        };
        records.insert(id, record.clone());
        Ok(record)
    }
}
