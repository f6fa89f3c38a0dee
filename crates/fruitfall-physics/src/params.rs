//! Board dimensions and tuning constants for the simulation.

use serde::{Deserialize, Serialize};

/// Playfield extents. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardDimensions {
    pub width: f32,
    pub height: f32,
    /// Fruits whose top edge rests at or above this line accumulate danger.
    pub danger_line: f32,
}

impl Default for BoardDimensions {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 600.0,
            danger_line: 120.0,
        }
    }
}

/// Per-tick physics constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsParams {
    /// Added to `vy` every tick.
    pub gravity: f32,
    /// Velocity multiplier applied every tick.
    pub friction: f32,
    /// Velocity components below this magnitude snap to zero.
    pub rest_epsilon: f32,
    /// Restitution against the walls and floor.
    pub wall_restitution: f32,
    /// Fraction of the overlap each fruit is pushed out by.
    pub separation_factor: f32,
    /// Restitution used for fruit-fruit impulses.
    pub contact_restitution: f32,
    /// Damping applied after a fruit-fruit impulse.
    pub contact_damping: f32,
    /// Closing speeds below this are treated as resting contact.
    pub resting_contact_speed: f32,
    /// Damping applied to both fruits in resting contact.
    pub resting_damping: f32,
    /// Share of the combined velocity inherited by a merged fruit.
    pub merge_velocity_factor: f32,
    /// A fruit is static for overflow purposes when both components are below this.
    pub static_speed: f32,
    /// Danger ticks tolerated before the board ends.
    pub danger_tick_limit: u32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: 0.4,
            friction: 0.98,
            rest_epsilon: 0.01,
            wall_restitution: 0.2,
            separation_factor: 0.6,
            contact_restitution: 0.15,
            contact_damping: 0.85,
            resting_contact_speed: 0.2,
            resting_damping: 0.7,
            merge_velocity_factor: 0.3,
            static_speed: 1.0,
            danger_tick_limit: 30,
        }
    }
}
