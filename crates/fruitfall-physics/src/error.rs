//! Simulation error types.

use crate::catalog::Tier;
use crate::fruit::FruitId;

/// Errors returned by [`SimulationEngine`](crate::SimulationEngine) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The tier index is outside the catalog.
    #[error("invalid fruit tier {0}")]
    InvalidTier(Tier),

    /// No fruit with this id is on the board.
    #[error("unknown fruit {0:?}")]
    UnknownFruit(FruitId),

    /// Both ids name the same fruit, the tiers differ, or both are the top
    /// tier. The per-tick merged flag is enforced by collision resolution, not
    /// here.
    #[error("fruits {0:?} and {1:?} cannot merge")]
    NotMergeable(FruitId, FruitId),
}
