//! Inbound envelope handling.
//!
//! The [`Dispatcher`] is the server's [`ConnectionHandler`]: it decodes each
//! frame, applies it to the [`RoomRegistry`], and fans the results out to room
//! members and the lobby. Every registry call returns its recipients, so all
//! sends below happen with no lock held.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use fruitfall_net::{
    ClientMessage, ConnectionHandler, ConnectionSession, ErrorCode, GameMode, ServerMessage,
    decode_message,
};

use crate::error::DispatchError;
use crate::lobby::LobbyBroadcaster;
use crate::registry::{Departure, GameEnd, GameOverReport, RoomRegistry};
use crate::store::RoomStore;
use crate::throttle::StateThrottle;

/// Longest accepted room name, in characters.
pub const MAX_ROOM_NAME: usize = 48;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum spacing between relayed unforced snapshots per sender.
    pub state_interval: Duration,
    /// Mode for rooms created without one.
    pub default_mode: GameMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            state_interval: Duration::from_millis(100),
            default_mode: GameMode::default(),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
    lobby: Arc<LobbyBroadcaster>,
    store: Arc<dyn RoomStore>,
    throttle: Mutex<StateThrottle>,
    default_mode: GameMode,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RoomRegistry>,
        lobby: Arc<LobbyBroadcaster>,
        store: Arc<dyn RoomStore>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            lobby,
            store,
            throttle: Mutex::new(StateThrottle::new(config.state_interval)),
            default_mode: config.default_mode,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn lobby(&self) -> &Arc<LobbyBroadcaster> {
        &self.lobby
    }

    /// Decode and handle one frame. Malformed input gets an `error` reply.
    pub fn handle_frame(&self, session: &ConnectionSession, payload: &[u8]) {
        match decode_message::<ClientMessage>(payload) {
            Ok(msg) => self.handle(session, msg),
            Err(e) => {
                tracing::debug!("Malformed frame from {}: {e}", session.identity());
                session.send(ServerMessage::error(ErrorCode::InvalidMessage, e.to_string()));
            }
        }
    }

    /// Handle one decoded message. Failures are reported to the sender only.
    pub fn handle(&self, session: &ConnectionSession, msg: ClientMessage) {
        let kind = msg.kind();
        let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(session, msg)))
            .unwrap_or_else(|_| {
                tracing::error!("Handler for {kind} from {} panicked", session.identity());
                Err(DispatchError::Internal)
            });

        if let Err(e) = result {
            tracing::debug!("{kind} from {} failed: {e}", session.identity());
            session.send(ServerMessage::error(e.code(), e.to_string()));
        }
    }

    fn dispatch(&self, session: &ConnectionSession, msg: ClientMessage) -> Result<(), DispatchError> {
        match msg {
            ClientMessage::Hello { .. } => {
                Err(DispatchError::Invalid("already authenticated".into()))
            }
            ClientMessage::ListRooms => {
                session.send(ServerMessage::RoomsList {
                    rooms: self.registry.rooms_list(),
                });
                Ok(())
            }
            ClientMessage::CreateRoom {
                name,
                password,
                game_mode,
            } => self.create_room(session, name, password, game_mode),
            ClientMessage::JoinRoom { room_id, password } => {
                let membership = self.registry.join(&room_id, session, password.as_deref())?;
                if let Some(previous) = membership.previous {
                    self.announce_departure(previous);
                }
                session.send(ServerMessage::RoomJoined {
                    room: membership.room.clone(),
                });
                fan_out(
                    &membership.others,
                    &ServerMessage::RoomUpdate {
                        room: membership.room,
                    },
                );
                self.lobby.publish_rooms(&self.registry);
                Ok(())
            }
            ClientMessage::LeaveRoom => {
                let departure = self.registry.leave_current(session.identity())?;
                self.announce_departure(departure);
                self.lobby.publish_rooms(&self.registry);
                Ok(())
            }
            ClientMessage::ToggleReady => {
                let outcome = self.registry.toggle_ready(session.identity())?;
                fan_out(
                    &outcome.members,
                    &ServerMessage::RoomUpdate {
                        room: outcome.room.clone(),
                    },
                );
                if let Some(game_mode) = outcome.started {
                    fan_out(
                        &outcome.members,
                        &ServerMessage::GameStart {
                            game_mode,
                            room: outcome.room,
                        },
                    );
                    self.lobby.publish_rooms(&self.registry);
                }
                Ok(())
            }
            ClientMessage::GameStateUpdate {
                score,
                moves,
                game_state,
                seq,
                forced,
            } => {
                let admitted = self
                    .throttle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .allow(session.identity(), forced, Instant::now());
                if !admitted {
                    tracing::trace!("Throttled snapshot {seq} from {}", session.identity());
                    return Ok(());
                }

                let relay = self.registry.record_state(session.identity(), score, moves)?;
                fan_out(
                    &relay.others,
                    &ServerMessage::OpponentGameState {
                        player_id: session.identity().clone(),
                        player_name: relay.sender_name,
                        score,
                        moves,
                        game_state,
                        seq,
                    },
                );
                Ok(())
            }
            ClientMessage::FruitDrop {
                x,
                fruit_type,
                timestamp,
                seq,
            } => {
                let relay = self.registry.record_drop(session.identity())?;
                fan_out(
                    &relay.others,
                    &ServerMessage::OpponentFruitDrop {
                        player_id: session.identity().clone(),
                        player_name: relay.sender_name,
                        x,
                        fruit_type,
                        timestamp,
                        seq,
                    },
                );
                Ok(())
            }
            ClientMessage::GameOver { score, reason } => {
                tracing::info!("{} game over ({reason:?}) at {score}", session.identity());
                match self.registry.report_game_over(session.identity(), score)? {
                    GameOverReport::Pending { room, members } => {
                        fan_out(&members, &ServerMessage::RoomUpdate { room });
                    }
                    GameOverReport::Ended(end) => {
                        announce_end(end);
                        self.lobby.publish_rooms(&self.registry);
                    }
                }
                Ok(())
            }
        }
    }

    fn create_room(
        &self,
        session: &ConnectionSession,
        name: String,
        password: Option<String>,
        game_mode: Option<GameMode>,
    ) -> Result<(), DispatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::Invalid("room name is empty".into()));
        }
        if name.chars().count() > MAX_ROOM_NAME {
            return Err(DispatchError::Invalid(format!(
                "room name longer than {MAX_ROOM_NAME} characters"
            )));
        }
        let game_mode = game_mode.unwrap_or(self.default_mode);
        if game_mode.limit == 0 {
            return Err(DispatchError::Invalid("game mode limit must be positive".into()));
        }
        let password = password.filter(|p| !p.is_empty());

        let record = self.store.create(name, password.is_some(), game_mode)?;
        self.registry.create_room(&record, password.clone())?;
        let membership = match self.registry.join(&record.id, session, password.as_deref()) {
            Ok(membership) => membership,
            Err(e) => {
                tracing::warn!("Creator {} could not join {}: {e}", session.identity(), record.id);
                self.registry.disband(&record.id);
                return Err(e.into());
            }
        };
        if let Some(previous) = membership.previous {
            self.announce_departure(previous);
        }

        session.send(ServerMessage::RoomJoined {
            room: membership.room,
        });
        self.lobby.publish_rooms(&self.registry);
        Ok(())
    }

    fn announce_departure(&self, departure: Departure) {
        if let Some(room) = departure.room {
            fan_out(&departure.remaining, &ServerMessage::RoomUpdate { room });
        }
        if let Some(end) = departure.ended {
            announce_end(end);
        }
    }
}

fn announce_end(end: GameEnd) {
    fan_out(
        &end.members,
        &ServerMessage::GameEnd {
            winner: end.outcome.winner,
            scores: end.outcome.scores,
            room: end.room,
        },
    );
}

fn fan_out(sessions: &[ConnectionSession], msg: &ServerMessage) {
    for session in sessions {
        session.send(msg.clone());
    }
}

impl ConnectionHandler for Dispatcher {
    fn on_open(&self, session: &ConnectionSession) {
        tracing::debug!("{} entered the lobby ({:?})", session.identity(), session.id());
        self.lobby.register(session);
        session.send(ServerMessage::RoomsList {
            rooms: self.registry.rooms_list(),
        });
    }

    fn on_frame(&self, session: &ConnectionSession, payload: &[u8]) {
        self.handle_frame(session, payload);
    }

    fn on_close(&self, session: &ConnectionSession) {
        let identity = session.identity();
        tracing::debug!("{identity} left the lobby ({:?})", session.id());

        if self.lobby.unregister(identity, session.id()) {
            self.throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .forget(identity);
        }
        if let Some(departure) = self.registry.disconnect(identity, session.id()) {
            self.announce_departure(departure);
        }
        self.lobby.publish_rooms(&self.registry);
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
