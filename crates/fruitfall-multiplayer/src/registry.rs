//! Server-wide room directory.
//!
//! Two lock levels: the directory mutex guards the room map and the
//! identity-to-room index, and each room has its own mutex. The directory is
//! always taken before a room, and at most one room is locked at a time.
//! Operations that only touch one room's state (relays, score updates) hold the
//! directory just long enough to clone the room handle.
//!
//! Nothing here sends messages. Every operation returns the recipient
//! snapshot alongside the new state so the caller can fan out after all locks
//! are released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fruitfall_net::{ConnectionId, ConnectionSession, GameMode, PlayerId, RoomId, RoomStatus, RoomView};

use crate::error::RoomError;
use crate::room::{JoinKind, Outcome, Room};
use crate::store::RoomRecord;

type RoomHandle = Arc<Mutex<Room>>;

fn lock_room(room: &RoomHandle) -> MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Directory {
    rooms: HashMap<RoomId, RoomHandle>,
    /// Each identity belongs to at most one room.
    membership: HashMap<PlayerId, RoomId>,
}

/// Result of a successful [`RoomRegistry::join`].
#[derive(Debug)]
pub struct Membership {
    pub room: RoomView,
    /// Attached members other than the joiner.
    pub others: Vec<ConnectionSession>,
    pub kind: JoinKind,
    /// The room the joiner had to leave first, if any.
    pub previous: Option<Departure>,
}

/// A player leaving or dropping out of a room.
#[derive(Debug)]
pub struct Departure {
    pub room_id: RoomId,
    /// `None` once the room has been deleted.
    pub room: Option<RoomView>,
    /// Attached members still in the room.
    pub remaining: Vec<ConnectionSession>,
    /// The player was kept as a detached member of a Playing room.
    pub detached: bool,
    /// Set when this departure completed the game.
    pub ended: Option<GameEnd>,
}

/// Result of a ready toggle.
#[derive(Debug)]
pub struct ReadyOutcome {
    pub room: RoomView,
    pub ready: bool,
    /// Every attached member, including the actor.
    pub members: Vec<ConnectionSession>,
    /// The mode, if this toggle started the game.
    pub started: Option<GameMode>,
}

/// Recipients of a relayed gameplay message.
#[derive(Debug)]
pub struct Relay {
    pub room_id: RoomId,
    pub sender_name: String,
    pub others: Vec<ConnectionSession>,
}

/// A room that has just moved to Finished.
#[derive(Debug, Clone)]
pub struct GameEnd {
    pub room: RoomView,
    pub outcome: Outcome,
    pub members: Vec<ConnectionSession>,
}

/// Result of [`RoomRegistry::report_game_over`].
#[derive(Debug)]
pub enum GameOverReport {
    /// Recorded; the opponent is still playing.
    Pending { room: RoomView, members: Vec<ConnectionSession> },
    Ended(GameEnd),
}

pub struct RoomRegistry {
    directory: Mutex<Directory>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            directory: Mutex::new(Directory::default()),
        }
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle of the room `identity` belongs to.
    fn current_room(&self, identity: &PlayerId) -> Result<(RoomId, RoomHandle), RoomError> {
        let directory = self.directory();
        let room_id = directory
            .membership
            .get(identity)
            .ok_or(RoomError::NotInRoom)?;
        let handle = directory
            .rooms
            .get(room_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        Ok((room_id.clone(), handle))
    }

    /// Register a new, empty Waiting room for `record`.
    pub fn create_room(
        &self,
        record: &RoomRecord,
        secret: Option<String>,
    ) -> Result<RoomView, RoomError> {
        let mut directory = self.directory();
        if directory.rooms.contains_key(&record.id) {
            return Err(RoomError::RoomExists(record.id.clone()));
        }

        let room = Room::new(
            record.id.clone(),
            record.name.clone(),
            secret,
            record.game_mode,
            record.created_at,
        );
        let view = room.view();
        directory
            .rooms
            .insert(record.id.clone(), Arc::new(Mutex::new(room)));
        tracing::info!("Room {} ({}) created", record.id, record.name);
        Ok(view)
    }

    /// Join `room_id` as the owner of `session`, leaving any other room first.
    ///
    /// Rejoining a room the identity is already in re-attaches the new
    /// connection and keeps the player's ready flag and score.
    pub fn join(
        &self,
        room_id: &RoomId,
        session: &ConnectionSession,
        password: Option<&str>,
    ) -> Result<Membership, RoomError> {
        let identity = session.identity();
        let mut directory = self.directory();
        let handle = directory
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;

        let (kind, room, others) = {
            let mut room = lock_room(&handle);
            if room.closed {
                return Err(RoomError::RoomNotFound(room_id.clone()));
            }
            let kind = room.join(identity, session.display_name(), session.clone(), password)?;
            (kind, room.view(), room.sessions(Some(identity)))
        };

        let previous = match directory.membership.get(identity) {
            Some(current) if current != room_id => {
                let current = current.clone();
                leave_locked(&mut directory, &current, identity)
            }
            _ => None,
        };
        directory
            .membership
            .insert(identity.clone(), room_id.clone());

        match kind {
            JoinKind::Joined => tracing::info!("{identity} joined room {room_id}"),
            JoinKind::Rejoined => tracing::info!("{identity} re-attached to room {room_id}"),
        }

        Ok(Membership {
            room,
            others,
            kind,
            previous,
        })
    }

    /// Remove `identity` from `room_id`.
    pub fn leave(&self, room_id: &RoomId, identity: &PlayerId) -> Result<Departure, RoomError> {
        let mut directory = self.directory();
        if !directory.rooms.contains_key(room_id) {
            return Err(RoomError::RoomNotFound(room_id.clone()));
        }
        if directory.membership.get(identity) != Some(room_id) {
            return Err(RoomError::NotInRoom);
        }
        leave_locked(&mut directory, room_id, identity).ok_or(RoomError::NotInRoom)
    }

    /// Remove `identity` from whatever room it is in.
    pub fn leave_current(&self, identity: &PlayerId) -> Result<Departure, RoomError> {
        let mut directory = self.directory();
        let room_id = directory
            .membership
            .get(identity)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        leave_locked(&mut directory, &room_id, identity).ok_or(RoomError::NotInRoom)
    }

    /// Connection `connection` of `identity` closed.
    ///
    /// Playing rooms keep the player as a detached member so it can resume;
    /// any other room drops it. Returns `None` when the identity is in no room
    /// or has already re-attached on a newer connection.
    pub fn disconnect(&self, identity: &PlayerId, connection: ConnectionId) -> Option<Departure> {
        let mut directory = self.directory();
        let room_id = directory.membership.get(identity).cloned()?;
        let handle = directory.rooms.get(&room_id).cloned()?;

        {
            let mut room = lock_room(&handle);
            if !room.is_attached(identity, connection) {
                tracing::debug!("Ignoring stale close of {connection:?} for {identity}");
                return None;
            }
            if room.status() == RoomStatus::Playing {
                room.detach(identity, connection);
                tracing::info!("{identity} detached from playing room {room_id}");
                let ended = finish_if_done(&mut room);
                return Some(Departure {
                    room_id,
                    room: Some(room.view()),
                    remaining: room.sessions(None),
                    detached: true,
                    ended,
                });
            }
        }

        leave_locked(&mut directory, &room_id, identity)
    }

    pub fn set_ready(&self, room_id: &RoomId, identity: &PlayerId, ready: bool) -> bool {
        let Some(handle) = self.directory().rooms.get(room_id).cloned() else {
            return false;
        };
        lock_room(&handle).set_ready(identity, ready)
    }

    /// Flip the ready flag of `identity` in its current room and start the
    /// game if that made the room startable. The start happens under the same
    /// room lock, so concurrent toggles start a room at most once.
    pub fn toggle_ready(&self, identity: &PlayerId) -> Result<ReadyOutcome, RoomError> {
        let (room_id, handle) = self.current_room(identity)?;
        let mut room = lock_room(&handle);
        if room.status() != RoomStatus::Waiting {
            return Err(RoomError::NotWaiting(room_id));
        }
        let ready = room.toggle_ready(identity).ok_or(RoomError::NotInRoom)?;

        let started = if room.can_start() && room.start(None) {
            tracing::info!("Room {room_id} started ({:?})", room.mode());
            Some(room.mode())
        } else {
            None
        };

        Ok(ReadyOutcome {
            room: room.view(),
            ready,
            members: room.sessions(None),
            started,
        })
    }

    pub fn can_start(&self, room_id: &RoomId) -> bool {
        self.directory()
            .rooms
            .get(room_id)
            .cloned()
            .is_some_and(|handle| lock_room(&handle).can_start())
    }

    /// Waiting -> Playing. Returns `false` when the room is missing or
    /// [`can_start`](Self::can_start) does not hold.
    pub fn start_game(&self, room_id: &RoomId, mode: Option<GameMode>) -> bool {
        let Some(handle) = self.directory().rooms.get(room_id).cloned() else {
            return false;
        };
        let mut room = lock_room(&handle);
        room.can_start() && room.start(mode)
    }

    /// Playing -> Finished regardless of who has reported.
    pub fn finish_game(&self, room_id: &RoomId) -> Option<GameEnd> {
        let handle = self.directory().rooms.get(room_id).cloned()?;
        let mut room = lock_room(&handle);
        if !room.finish() {
            return None;
        }
        Some(game_end(&room))
    }

    /// Record a state update from `identity` and return who should see it.
    pub fn record_state(
        &self,
        identity: &PlayerId,
        score: u64,
        moves: u32,
    ) -> Result<Relay, RoomError> {
        self.relay(identity, |room| {
            room.record_state(identity, score, moves);
        })
    }

    /// Count a drop from `identity` and return who should see it.
    pub fn record_drop(&self, identity: &PlayerId) -> Result<Relay, RoomError> {
        self.relay(identity, |room| {
            room.record_drop(identity);
        })
    }

    fn relay(&self, identity: &PlayerId, apply: impl FnOnce(&mut Room)) -> Result<Relay, RoomError> {
        let (room_id, handle) = self.current_room(identity)?;
        let mut room = lock_room(&handle);
        if room.closed || !room.contains(identity) {
            return Err(RoomError::NotInRoom);
        }
        apply(&mut room);
        let sender_name = room
            .player(identity)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        Ok(Relay {
            room_id,
            sender_name,
            others: room.sessions(Some(identity)),
        })
    }

    /// The board of `identity` has ended with `score`. The room finishes once
    /// every member has either reported or is detached.
    pub fn report_game_over(
        &self,
        identity: &PlayerId,
        score: u64,
    ) -> Result<GameOverReport, RoomError> {
        let (room_id, handle) = self.current_room(identity)?;
        let mut room = lock_room(&handle);
        if room.status() != RoomStatus::Playing {
            return Err(RoomError::NotPlaying(room_id));
        }
        room.mark_finished(identity, score);

        match finish_if_done(&mut room) {
            Some(end) => Ok(GameOverReport::Ended(end)),
            None => Ok(GameOverReport::Pending {
                room: room.view(),
                members: room.sessions(None),
            }),
        }
    }

    /// Remove a room regardless of membership. Returns the sessions that were
    /// attached to it.
    pub fn disband(&self, room_id: &RoomId) -> Option<Vec<ConnectionSession>> {
        let mut directory = self.directory();
        let handle = directory.rooms.remove(room_id)?;
        directory.membership.retain(|_, r| r != room_id);
        let mut room = lock_room(&handle);
        room.closed = true;
        tracing::info!("Room {room_id} disbanded");
        Some(room.sessions(None))
    }

    pub fn room_of(&self, identity: &PlayerId) -> Option<RoomId> {
        self.directory().membership.get(identity).cloned()
    }

    pub fn room_view(&self, room_id: &RoomId) -> Option<RoomView> {
        let handle = self.directory().rooms.get(room_id).cloned()?;
        let view = lock_room(&handle).view();
        Some(view)
    }

    /// Every room, oldest first.
    pub fn rooms_list(&self) -> Vec<RoomView> {
        let directory = self.directory();
        let mut rooms: Vec<(u64, RoomView)> = directory
            .rooms
            .values()
            .map(|handle| {
                let room = lock_room(handle);
                (room.created_at(), room.view())
            })
            .collect();
        rooms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        rooms.into_iter().map(|(_, view)| view).collect()
    }

    pub fn len(&self) -> usize {
        self.directory().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove `identity` from `room_id` with the directory already locked.
fn leave_locked(directory: &mut Directory, room_id: &RoomId, identity: &PlayerId) -> Option<Departure> {
    let handle = directory.rooms.get(room_id).cloned()?;
    let mut room = lock_room(&handle);
    if !room.leave(identity) {
        return None;
    }
    directory.membership.remove(identity);
    tracing::info!("{identity} left room {room_id}");

    if room.is_disposable() {
        room.closed = true;
        directory.rooms.remove(room_id);
        tracing::info!("Room {room_id} deleted");
        return Some(Departure {
            room_id: room_id.clone(),
            room: None,
            remaining: Vec::new(),
            detached: false,
            ended: None,
        });
    }

    let ended = if room.status() == RoomStatus::Playing {
        finish_if_done(&mut room)
    } else {
        None
    };
    Some(Departure {
        room_id: room_id.clone(),
        room: Some(room.view()),
        remaining: room.sessions(None),
        detached: false,
        ended,
    })
}

fn finish_if_done(room: &mut Room) -> Option<GameEnd> {
    if room.all_done() && room.finish() {
        tracing::info!("Room {} finished", room.id());
        Some(game_end(room))
    } else {
        None
    }
}

fn game_end(room: &Room) -> GameEnd {
    GameEnd {
        room: room.view(),
        outcome: room.outcome(),
        members: room.sessions(None),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
