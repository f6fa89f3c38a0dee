//! Fixed-tick board simulation: gravity, wall and fruit contacts, tier
//! merges, and overflow detection.
//!
//! A [`SimulationEngine`] owns one player's board. The local player drives it
//! with [`SimulationEngine::drop_next`]; a remote mirror is driven instead by
//! [`SimulationEngine::drop_at`] and [`SimulationEngine::apply_external_state`].

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{FruitCatalog, Tier};
use crate::collision;
use crate::error::SimError;
use crate::fruit::{Fruit, FruitId};
use crate::params::{BoardDimensions, PhysicsParams};
use crate::snapshot::BoardSnapshot;

/// Board lifecycle. `GameOver` is terminal until [`SimulationEngine::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Active,
    GameOver,
}

/// Emitted once per merge for sound and analytics hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeEvent {
    /// The fruit created by the merge.
    pub fruit: Fruit,
    /// The two fruits removed by the merge.
    pub consumed: [FruitId; 2],
    /// Points added to the board score.
    pub score_delta: u32,
}

/// Outcome of one [`SimulationEngine::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub merges: Vec<MergeEvent>,
    pub game_over: bool,
}

/// One player's board.
pub struct SimulationEngine {
    dimensions: BoardDimensions,
    params: PhysicsParams,
    fruits: Vec<Fruit>,
    score: u64,
    state: BoardState,
    next_tier: Tier,
    next_id: u64,
    rng: StdRng,
}

impl SimulationEngine {
    /// Create an empty board seeded from the OS RNG.
    pub fn new(dimensions: BoardDimensions) -> Self {
        Self::from_rng(dimensions, StdRng::from_os_rng())
    }

    /// Create an empty board with a deterministic RNG.
    pub fn with_seed(dimensions: BoardDimensions, seed: u64) -> Self {
        Self::from_rng(dimensions, StdRng::seed_from_u64(seed))
    }

    fn from_rng(dimensions: BoardDimensions, rng: StdRng) -> Self {
        let mut engine = Self {
            dimensions,
            params: PhysicsParams::default(),
            fruits: Vec::new(),
            score: 0,
            state: BoardState::Active,
            next_tier: 0,
            next_id: 1,
            rng,
        };
        engine.roll_next_tier();
        engine
    }

    /// Replace the physics constants.
    pub fn with_params(mut self, params: PhysicsParams) -> Self {
        self.params = params;
        self
    }

    pub fn dimensions(&self) -> &BoardDimensions {
        &self.dimensions
    }

    pub fn fruits(&self) -> &[Fruit] {
        &self.fruits
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn is_game_over(&self) -> bool {
        self.state == BoardState::GameOver
    }

    /// The tier [`drop_next`](Self::drop_next) will spawn.
    pub fn next_tier(&self) -> Tier {
        self.next_tier
    }

    /// Advance the board by one tick.
    ///
    /// Integrates every fruit, resolves contacts and merges, then checks for
    /// overflow. A board in [`BoardState::GameOver`] does not advance.
    pub fn step(&mut self) -> StepReport {
        if self.is_game_over() {
            return StepReport {
                merges: Vec::new(),
                game_over: true,
            };
        }

        for fruit in &mut self.fruits {
            fruit.merged = false;
        }
        self.integrate();
        let merges = self.resolve_collisions();
        let game_over = self.check_overflow();

        StepReport { merges, game_over }
    }

    fn integrate(&mut self) {
        let p = &self.params;
        let width = self.dimensions.width;
        let height = self.dimensions.height;

        for fruit in &mut self.fruits {
            fruit.velocity.y += p.gravity;
            fruit.position += fruit.velocity;
            fruit.velocity *= p.friction;

            if fruit.velocity.x.abs() < p.rest_epsilon {
                fruit.velocity.x = 0.0;
            }
            if fruit.velocity.y.abs() < p.rest_epsilon {
                fruit.velocity.y = 0.0;
            }

            if fruit.position.x - fruit.radius < 0.0 {
                fruit.position.x = fruit.radius;
                fruit.velocity.x *= -p.wall_restitution;
            }
            if fruit.position.x + fruit.radius > width {
                fruit.position.x = width - fruit.radius;
                fruit.velocity.x *= -p.wall_restitution;
            }
            if fruit.position.y + fruit.radius > height {
                fruit.position.y = height - fruit.radius;
                fruit.velocity.y *= -p.wall_restitution;
            }
        }
    }

    /// Pairwise contact pass in index order, followed by the merges it found.
    ///
    /// The first eligible pair wins: once a fruit is flagged as merged it is
    /// skipped for the rest of the tick. Merged fruits are appended after the
    /// scan, so they are not revisited until the next tick.
    pub fn resolve_collisions(&mut self) -> Vec<MergeEvent> {
        let mut pending = Vec::new();
        let count = self.fruits.len();

        for i in 0..count {
            for j in (i + 1)..count {
                let (head, tail) = self.fruits.split_at_mut(j);
                let (a, b) = (&mut head[i], &mut tail[0]);

                if !collision::resolve_pair(a, b, &self.params, &mut self.rng) {
                    continue;
                }
                if collision::can_merge(a, b) {
                    a.merged = true;
                    b.merged = true;
                    pending.push((a.id, b.id));
                }
            }
        }

        pending
            .into_iter()
            .filter_map(|(a, b)| self.merge_fruits(a, b).ok())
            .collect()
    }

    /// Replace fruits `a` and `b` with one fruit of the next tier at their
    /// midpoint and add that tier's score to the board.
    pub fn merge_fruits(&mut self, a: FruitId, b: FruitId) -> Result<MergeEvent, SimError> {
        if a == b {
            return Err(SimError::NotMergeable(a, b));
        }
        let first = self.index_of(a).ok_or(SimError::UnknownFruit(a))?;
        let second = self.index_of(b).ok_or(SimError::UnknownFruit(b))?;

        let id = FruitId(self.next_id);
        let fruit = collision::merged_fruit(
            id,
            &self.fruits[first],
            &self.fruits[second],
            &self.params,
        )
        .ok_or(SimError::NotMergeable(a, b))?;
        self.next_id += 1;

        let score_delta = FruitCatalog::get(fruit.tier).map_or(0, |t| t.score);
        self.score += u64::from(score_delta);
        self.fruits.retain(|f| f.id != a && f.id != b);
        self.fruits.push(fruit.clone());

        tracing::debug!(
            "Merged {a:?} + {b:?} into tier {} (+{score_delta}, score {})",
            fruit.tier,
            self.score
        );

        Ok(MergeEvent {
            fruit,
            consumed: [a, b],
            score_delta,
        })
    }

    /// Update danger timers and end the board once a fruit has rested above
    /// the danger line for more than the tick limit.
    pub fn check_overflow(&mut self) -> bool {
        if self.is_game_over() {
            return true;
        }

        let line = self.dimensions.danger_line;
        let static_speed = self.params.static_speed;
        let limit = self.params.danger_tick_limit;

        for fruit in &mut self.fruits {
            if fruit.top() <= line && fruit.is_resting(static_speed) {
                fruit.danger_ticks += 1;
                if fruit.danger_ticks > limit {
                    self.state = BoardState::GameOver;
                    tracing::info!(
                        "Board overflowed: {:?} rested above the line for {} ticks (score {})",
                        fruit.id,
                        fruit.danger_ticks,
                        self.score
                    );
                    return true;
                }
            } else {
                fruit.danger_ticks = 0;
            }
        }

        false
    }

    /// Spawn a resting fruit of `tier` at the top of the board. `x` is clamped
    /// so the fruit lies within the walls.
    pub fn drop_at(&mut self, x: f32, tier: Tier) -> Result<FruitId, SimError> {
        let spec = FruitCatalog::get(tier).ok_or(SimError::InvalidTier(tier))?;
        let x = x.min(self.dimensions.width - spec.radius).max(spec.radius);

        let id = FruitId(self.next_id);
        let fruit = Fruit::new(id, tier, Vec2::new(x, spec.radius))
            .ok_or(SimError::InvalidTier(tier))?;
        self.next_id += 1;
        self.fruits.push(fruit);
        Ok(id)
    }

    /// Drop the hinted tier at `x` and roll a new hint.
    pub fn drop_next(&mut self, x: f32) -> Result<(FruitId, Tier), SimError> {
        let tier = self.next_tier;
        let id = self.drop_at(x, tier)?;
        self.roll_next_tier();
        Ok((id, tier))
    }

    /// Copy of the full board state.
    pub fn export_snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            fruits: self.fruits.clone(),
            score: self.score,
            game_over: self.is_game_over(),
            next_tier: self.next_tier,
        }
    }

    /// Overwrite the board with a remote snapshot. The snapshot is trusted as is.
    pub fn apply_external_state(&mut self, snapshot: BoardSnapshot) {
        self.next_id = snapshot
            .fruits
            .iter()
            .map(|f| f.id.0 + 1)
            .max()
            .unwrap_or(1)
            .max(self.next_id);
        self.fruits = snapshot.fruits;
        self.score = snapshot.score;
        self.state = if snapshot.game_over {
            BoardState::GameOver
        } else {
            BoardState::Active
        };
        self.next_tier = snapshot.next_tier;
    }

    /// Discard the board and start a fresh one.
    pub fn reset(&mut self) {
        self.fruits.clear();
        self.score = 0;
        self.state = BoardState::Active;
        self.roll_next_tier();
    }

    fn roll_next_tier(&mut self) {
        self.next_tier = self.rng.random_range(0..FruitCatalog::DROPPABLE_TIERS);
    }

    fn index_of(&self, id: FruitId) -> Option<usize> {
        self.fruits.iter().position(|f| f.id == id)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
