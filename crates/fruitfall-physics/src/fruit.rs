//! Fruit bodies and their per-board identifiers.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::catalog::{FruitCatalog, Tier};

/// Identifier of a fruit within one board. Never reused while the board lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FruitId(pub u64);

/// A circular body on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fruit {
    pub id: FruitId,
    /// Center position. `y` grows downward; the floor is at the board height.
    pub position: Vec2,
    /// Displacement per tick.
    pub velocity: Vec2,
    pub radius: f32,
    #[serde(rename = "type")]
    pub tier: Tier,
    /// Set when the fruit took part in a merge this tick.
    #[serde(default)]
    pub merged: bool,
    /// Consecutive ticks spent resting above the danger line.
    #[serde(default)]
    pub danger_ticks: u32,
}

impl Fruit {
    /// Create a resting fruit of `tier` at `position`. Returns `None` for an
    /// unknown tier.
    pub fn new(id: FruitId, tier: Tier, position: Vec2) -> Option<Self> {
        let spec = FruitCatalog::get(tier)?;
        Some(Self {
            id,
            position,
            velocity: Vec2::ZERO,
            radius: spec.radius,
            tier,
            merged: false,
            danger_ticks: 0,
        })
    }

    /// Y coordinate of the top edge.
    pub fn top(&self) -> f32 {
        self.position.y - self.radius
    }

    /// Whether both velocity components are below `threshold` in magnitude.
    pub fn is_resting(&self, threshold: f32) -> bool {
        self.velocity.x.abs() < threshold && self.velocity.y.abs() < threshold
    }
}
