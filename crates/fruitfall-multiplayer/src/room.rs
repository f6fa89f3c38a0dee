//! A single duel room and its members.
//!
//! `Room` is plain data guarded by the registry's per-room mutex. It enforces
//! capacity and the lifecycle `Waiting -> Playing -> Finished`; nothing ever
//! moves a room back to `Waiting`.

use fruitfall_net::{
    ConnectionId, ConnectionSession, FinalScore, GameMode, PlayerId, PlayerView, RoomId,
    RoomStatus, RoomView,
};

use crate::error::RoomError;

/// Members per room.
pub const ROOM_CAPACITY: usize = 2;

/// One member of a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
    /// Last reported score.
    pub score: u64,
    /// Fruits dropped this game.
    pub moves: u32,
    /// Final score once the player's board has ended.
    pub final_score: Option<u64>,
    /// `None` while the player is disconnected.
    pub connection: Option<ConnectionSession>,
}

impl Player {
    fn new(id: PlayerId, name: String, connection: ConnectionSession) -> Self {
        Self {
            id,
            name,
            ready: false,
            score: 0,
            moves: 0,
            final_score: None,
            connection: Some(connection),
        }
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            ready: self.ready,
            score: self.score,
            moves: self.moves,
            connected: self.connection.is_some(),
        }
    }
}

/// Whether [`Room::join`] added a player or re-attached an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Joined,
    Rejoined,
}

/// Final result of a finished room.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// `None` on a tie.
    pub winner: Option<PlayerId>,
    pub scores: Vec<FinalScore>,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    secret: Option<String>,
    status: RoomStatus,
    mode: GameMode,
    players: Vec<Player>,
    created_at: u64,
    /// Set once the registry has dropped this room.
    pub(crate) closed: bool,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: String,
        secret: Option<String>,
        mode: GameMode,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            name,
            secret: secret.filter(|s| !s.is_empty()),
            status: RoomStatus::Waiting,
            mode,
            players: Vec::with_capacity(ROOM_CAPACITY),
            created_at,
            closed: false,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= ROOM_CAPACITY
    }

    pub fn contains(&self, identity: &PlayerId) -> bool {
        self.player(identity).is_some()
    }

    pub fn player(&self, identity: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == identity)
    }

    fn player_mut(&mut self, identity: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == identity)
    }

    /// Add `identity`, or re-attach its connection if it is already a member.
    /// Re-attaching keeps the ready flag and score.
    pub fn join(
        &mut self,
        identity: &PlayerId,
        name: &str,
        connection: ConnectionSession,
        password: Option<&str>,
    ) -> Result<JoinKind, RoomError> {
        if let Some(secret) = &self.secret {
            if password != Some(secret.as_str()) {
                return Err(RoomError::SecretMismatch(self.id.clone()));
            }
        }

        if let Some(player) = self.player_mut(identity) {
            player.connection = Some(connection);
            return Ok(JoinKind::Rejoined);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        self.players
            .push(Player::new(identity.clone(), name.to_string(), connection));
        Ok(JoinKind::Joined)
    }

    /// Remove `identity`. Returns `false` if it was not a member.
    pub fn leave(&mut self, identity: &PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| &p.id != identity);
        self.players.len() != before
    }

    /// Clear the connection of `identity` if it is still `connection`.
    /// Returns `false` for a stale close.
    pub fn detach(&mut self, identity: &PlayerId, connection: ConnectionId) -> bool {
        match self.player_mut(identity) {
            Some(player) if player.connection.as_ref().map(|c| c.id()) == Some(connection) => {
                player.connection = None;
                true
            }
            _ => false,
        }
    }

    /// Whether `connection` is the live connection of `identity` here.
    pub fn is_attached(&self, identity: &PlayerId, connection: ConnectionId) -> bool {
        self.player(identity)
            .and_then(|p| p.connection.as_ref())
            .is_some_and(|c| c.id() == connection)
    }

    /// No-op returning `false` if `identity` is not a member or the room has
    /// left Waiting.
    pub fn set_ready(&mut self, identity: &PlayerId, ready: bool) -> bool {
        if self.status != RoomStatus::Waiting {
            return false;
        }
        match self.player_mut(identity) {
            Some(player) => {
                player.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Flip the ready flag. Returns the new value, or `None` for a non-member
    /// or a room that has left Waiting.
    pub fn toggle_ready(&mut self, identity: &PlayerId) -> Option<bool> {
        if self.status != RoomStatus::Waiting {
            return None;
        }
        let player = self.player_mut(identity)?;
        player.ready = !player.ready;
        Some(player.ready)
    }

    /// Exactly two members, all ready, still waiting.
    pub fn can_start(&self) -> bool {
        self.status == RoomStatus::Waiting
            && self.players.len() == ROOM_CAPACITY
            && self.players.iter().all(|p| p.ready)
    }

    /// `Waiting -> Playing`. Returns `false` in any other state.
    pub fn start(&mut self, mode: Option<GameMode>) -> bool {
        if self.status != RoomStatus::Waiting {
            return false;
        }
        if let Some(mode) = mode {
            self.mode = mode;
        }
        for player in &mut self.players {
            player.score = 0;
            player.moves = 0;
            player.final_score = None;
        }
        self.status = RoomStatus::Playing;
        true
    }

    pub fn record_state(&mut self, identity: &PlayerId, score: u64, moves: u32) -> bool {
        match self.player_mut(identity) {
            Some(player) => {
                player.score = score;
                player.moves = moves;
                true
            }
            None => false,
        }
    }

    pub fn record_drop(&mut self, identity: &PlayerId) -> bool {
        match self.player_mut(identity) {
            Some(player) => {
                player.moves = player.moves.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Record that the board of `identity` ended with `score`.
    pub fn mark_finished(&mut self, identity: &PlayerId, score: u64) -> bool {
        match self.player_mut(identity) {
            Some(player) => {
                player.score = score;
                player.final_score = Some(score);
                true
            }
            None => false,
        }
    }

    /// Every member has either finished or is disconnected, and at least one
    /// has finished.
    pub fn all_done(&self) -> bool {
        self.players.iter().any(|p| p.final_score.is_some())
            && self
                .players
                .iter()
                .all(|p| p.final_score.is_some() || p.connection.is_none())
    }

    /// `Playing -> Finished`. Returns `false` in any other state.
    pub fn finish(&mut self) -> bool {
        if self.status != RoomStatus::Playing {
            return false;
        }
        self.status = RoomStatus::Finished;
        true
    }

    /// Highest score wins; equal top scores are a tie.
    pub fn outcome(&self) -> Outcome {
        let scores: Vec<FinalScore> = self
            .players
            .iter()
            .map(|p| FinalScore {
                player_id: p.id.clone(),
                name: p.name.clone(),
                score: p.final_score.unwrap_or(p.score),
            })
            .collect();

        let best = scores.iter().map(|s| s.score).max();
        let mut leaders = scores.iter().filter(|s| Some(s.score) == best);
        let winner = match (leaders.next(), leaders.next()) {
            (Some(leader), None) => Some(leader.player_id.clone()),
            _ => None,
        };

        Outcome { winner, scores }
    }

    /// Empty and not mid-game.
    pub fn is_disposable(&self) -> bool {
        self.players.is_empty() && self.status != RoomStatus::Playing
    }

    /// Attached connections, optionally skipping one identity.
    pub fn sessions(&self, exclude: Option<&PlayerId>) -> Vec<ConnectionSession> {
        self.players
            .iter()
            .filter(|p| Some(&p.id) != exclude)
            .filter_map(|p| p.connection.clone())
            .collect()
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            name: self.name.clone(),
            has_password: self.secret.is_some(),
            player_count: self.players.len(),
            max_players: ROOM_CAPACITY,
            status: self.status,
            game_mode: self.mode,
            players: self.players.iter().map(Player::view).collect(),
        }
    }
}
