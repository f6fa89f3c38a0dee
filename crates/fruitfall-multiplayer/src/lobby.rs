//! Lobby-wide room list pushes.

use dashmap::DashMap;

use fruitfall_net::{ConnectionId, ConnectionSession, PlayerId, SendOutcome, ServerMessage};

use crate::registry::RoomRegistry;

/// Every connected identity, keyed by identity. A reconnect replaces the
/// previous connection's entry.
#[derive(Default)]
pub struct LobbyBroadcaster {
    sessions: DashMap<PlayerId, ConnectionSession>,
}

impl LobbyBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: &ConnectionSession) {
        if let Some(old) = self
            .sessions
            .insert(session.identity().clone(), session.clone())
        {
            tracing::debug!(
                "{} replaced {:?} with {:?} in the lobby",
                session.identity(),
                old.id(),
                session.id()
            );
        }
    }

    /// Drop `identity` unless it has already re-registered on a newer
    /// connection.
    pub fn unregister(&self, identity: &PlayerId, connection: ConnectionId) -> bool {
        self.sessions
            .remove_if(identity, |_, session| session.id() == connection)
            .is_some()
    }

    pub fn session_for(&self, identity: &PlayerId) -> Option<ConnectionSession> {
        self.sessions.get(identity).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Send `msg` to every connected identity. Returns how many queued it.
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        let recipients: Vec<ConnectionSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        recipients
            .iter()
            .filter(|session| session.send(msg.clone()) == SendOutcome::Queued)
            .count()
    }

    /// Push the current room list to everyone.
    pub fn publish_rooms(&self, registry: &RoomRegistry) -> usize {
        let rooms = registry.rooms_list();
        tracing::debug!("Publishing {} rooms to {} sessions", rooms.len(), self.len());
        self.broadcast(&ServerMessage::RoomsList { rooms })
    }
}
