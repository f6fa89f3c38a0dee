//! Serializable board state exchanged between a board and its remote mirror.

use serde::{Deserialize, Serialize};

use crate::catalog::Tier;
use crate::fruit::Fruit;

/// Full board state: every fruit, the score, the game-over flag, and the
/// next-tier hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardSnapshot {
    pub fruits: Vec<Fruit>,
    pub score: u64,
    pub game_over: bool,
    #[serde(rename = "nextFruitType")]
    pub next_tier: Tier,
}
