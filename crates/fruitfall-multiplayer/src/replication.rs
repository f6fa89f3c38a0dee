//! Client-side board replication.
//!
//! A [`LocalBoard`] wraps the player's own engine and turns drops and ticks
//! into outbound messages: drops go out immediately, snapshots at most once per
//! interval. An [`OpponentMirror`] replays the opponent's messages onto a
//! second engine. Both directions share one sequence counter per board, and the
//! mirror discards anything at or below the last sequence it applied, so a late
//! snapshot can no longer overwrite a newer drop.
//!
//! A board given the room's [`GameMode`] also ends itself once the move or
//! time limit runs out.

use std::time::{Duration, Instant};

use fruitfall_net::{ClientMessage, GameMode, GameOverReason, ModeKind, PlayerId, ServerMessage};
use fruitfall_physics::{SimError, SimulationEngine, StepReport};

/// Default spacing between unforced snapshots.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

/// The local player's board.
pub struct LocalBoard {
    engine: SimulationEngine,
    seq: u64,
    moves: u32,
    snapshot_interval: Duration,
    last_snapshot: Option<Instant>,
    mode: Option<GameMode>,
    started_at: Option<Instant>,
    /// `game_over` has been handed out for the current game.
    reported: bool,
}

impl LocalBoard {
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            engine,
            seq: 0,
            moves: 0,
            snapshot_interval: SNAPSHOT_INTERVAL,
            last_snapshot: None,
            mode: None,
            started_at: None,
            reported: false,
        }
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Begin a game under `mode` on a fresh board. Time limits count from
    /// `now`.
    pub fn start(&mut self, mode: GameMode, now: Instant) {
        self.reset();
        self.mode = Some(mode);
        self.started_at = Some(now);
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    /// Whether the room's move or time limit has run out. Always `false`
    /// without a mode.
    pub fn limit_reached(&self, now: Instant) -> bool {
        match self.mode {
            Some(GameMode {
                kind: ModeKind::Moves,
                limit,
            }) => self.moves >= limit,
            Some(GameMode {
                kind: ModeKind::Time,
                limit,
            }) => self.started_at.is_some_and(|start| {
                now.saturating_duration_since(start) >= Duration::from_secs(u64::from(limit))
            }),
            None => false,
        }
    }

    /// The board's `game_over`, the first time it is due: on overflow, or once
    /// the limit runs out. `None` before that and after it has been taken.
    pub fn take_game_over(&mut self, now: Instant) -> Option<ClientMessage> {
        if self.reported {
            return None;
        }
        let reason = if self.engine.is_game_over() {
            GameOverReason::Overflow
        } else if self.limit_reached(now) {
            GameOverReason::LimitReached
        } else {
            return None;
        };
        self.reported = true;
        Some(self.game_over_message(reason))
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    /// Last sequence number handed out.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Drop the hinted fruit at `x` and build the matching `fruit_drop`.
    pub fn drop_fruit(&mut self, x: f32, timestamp_ms: u64) -> Result<ClientMessage, SimError> {
        let (_, tier) = self.engine.drop_next(x)?;
        self.moves += 1;
        Ok(ClientMessage::FruitDrop {
            x,
            fruit_type: tier,
            timestamp: timestamp_ms,
            seq: self.next_seq(),
        })
    }

    /// Advance one tick. The returned snapshot is forced when the board has
    /// just ended, otherwise subject to the interval.
    pub fn tick(&mut self, now: Instant) -> (StepReport, Option<ClientMessage>) {
        let report = self.engine.step();
        let snapshot = self.snapshot_message(now, report.game_over);
        (report, snapshot)
    }

    /// A `game_state_update`, or `None` if the previous one is too recent.
    pub fn snapshot_message(&mut self, now: Instant, forced: bool) -> Option<ClientMessage> {
        let due = self
            .last_snapshot
            .is_none_or(|last| now.saturating_duration_since(last) >= self.snapshot_interval);
        if !due && !forced {
            return None;
        }
        self.last_snapshot = Some(now);

        Some(ClientMessage::GameStateUpdate {
            score: self.engine.score(),
            moves: self.moves,
            game_state: self.engine.export_snapshot(),
            seq: self.next_seq(),
            forced,
        })
    }

    pub fn game_over_message(&self, reason: GameOverReason) -> ClientMessage {
        ClientMessage::GameOver {
            score: self.engine.score(),
            reason,
        }
    }

    /// Fresh board for a new game. The sequence keeps counting up.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.moves = 0;
        self.last_snapshot = None;
        self.started_at = None;
        self.reported = false;
    }
}

/// What [`OpponentMirror::apply`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    Applied,
    /// At or below the last applied sequence; discarded.
    Stale,
    /// Not an opponent board message, or the drop could not be replayed.
    Ignored,
}

/// The opponent's board as seen locally.
pub struct OpponentMirror {
    engine: SimulationEngine,
    opponent: Option<PlayerId>,
    last_seq: Option<u64>,
    score: u64,
    moves: u32,
}

impl OpponentMirror {
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            engine,
            opponent: None,
            last_seq: None,
            score: 0,
            moves: 0,
        }
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub fn opponent(&self) -> Option<&PlayerId> {
        self.opponent.as_ref()
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    fn is_stale(&self, seq: u64) -> bool {
        self.last_seq.is_some_and(|last| seq <= last)
    }

    pub fn apply(&mut self, msg: &ServerMessage) -> MirrorUpdate {
        match msg {
            ServerMessage::OpponentGameState {
                player_id,
                score,
                moves,
                game_state,
                seq,
                ..
            } => {
                if self.is_stale(*seq) {
                    tracing::trace!("Discarding stale snapshot {seq} from {player_id}");
                    return MirrorUpdate::Stale;
                }
                self.engine.apply_external_state(game_state.clone());
                self.opponent = Some(player_id.clone());
                self.score = *score;
                self.moves = *moves;
                self.last_seq = Some(*seq);
                MirrorUpdate::Applied
            }
            ServerMessage::OpponentFruitDrop {
                player_id,
                x,
                fruit_type,
                seq,
                ..
            } => {
                if self.is_stale(*seq) {
                    tracing::trace!("Discarding stale drop {seq} from {player_id}");
                    return MirrorUpdate::Stale;
                }
                self.last_seq = Some(*seq);
                if let Err(e) = self.engine.drop_at(*x, *fruit_type) {
                    tracing::debug!("Ignoring drop from {player_id}: {e}");
                    return MirrorUpdate::Ignored;
                }
                self.opponent = Some(player_id.clone());
                self.moves = self.moves.saturating_add(1);
                MirrorUpdate::Applied
            }
            _ => MirrorUpdate::Ignored,
        }
    }

    /// Keep the mirror moving between snapshots.
    pub fn tick(&mut self) -> StepReport {
        self.engine.step()
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.opponent = None;
        self.last_seq = None;
        self.score = 0;
        self.moves = 0;
    }
}

#[cfg(test)]
#[path = "replication_tests.rs"]
mod tests;
