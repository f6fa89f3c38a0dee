//! Room coordination for 1v1 Fruitfall matches.
//!
//! The server side is a [`RoomRegistry`] of two-player [`Room`]s, a
//! [`LobbyBroadcaster`] that keeps every connection's room list current, and
//! the [`Dispatcher`] that routes client envelopes between them. The client
//! side pairs a [`LocalBoard`] with an [`OpponentMirror`].

pub mod dispatcher;
pub mod error;
pub mod lobby;
pub mod registry;
pub mod replication;
pub mod room;
pub mod store;
pub mod throttle;

pub use dispatcher::{DispatchConfig, Dispatcher, MAX_ROOM_NAME};
pub use error::{DispatchError, RoomError};
pub use lobby::LobbyBroadcaster;
pub use registry::{
    Departure, GameEnd, GameOverReport, Membership, ReadyOutcome, Relay, RoomRegistry,
};
pub use replication::{LocalBoard, MirrorUpdate, OpponentMirror, SNAPSHOT_INTERVAL};
pub use room::{JoinKind, Outcome, Player, ROOM_CAPACITY, Room};
pub use store::{MemoryRoomStore, RoomRecord, RoomStore, StoreError, unix_millis};
pub use throttle::StateThrottle;
