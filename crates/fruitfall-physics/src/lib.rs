//! Fruit-merge board physics: gravity, circle contacts, tier merges, and
//! overflow detection on a fixed tick.
//!
//! Each player owns one [`SimulationEngine`]. Its state can be exported as a
//! [`BoardSnapshot`] and applied to a mirror engine on the opponent's side.

pub mod catalog;
pub mod collision;
pub mod engine;
pub mod error;
pub mod fruit;
pub mod params;
pub mod snapshot;

pub use catalog::{FruitCatalog, FruitTier, Tier};
pub use engine::{BoardState, MergeEvent, SimulationEngine, StepReport};
pub use error::SimError;
pub use fruit::{Fruit, FruitId};
pub use params::{BoardDimensions, PhysicsParams};
pub use snapshot::BoardSnapshot;
