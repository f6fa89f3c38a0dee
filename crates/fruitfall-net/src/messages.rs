//! Wire message types and JSON encoding.
//!
//! Every frame carries one JSON object tagged by a `type` field, e.g.
//! `{"type":"join_room","roomId":"r1"}`. Field names are camelCase.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fruitfall_physics::{BoardSnapshot, Tier};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable player identity. Survives socket replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Room identifier, issued by the room store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// How a match is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    /// Each player may drop at most `limit` fruits.
    Moves,
    /// The match lasts `limit` seconds.
    Time,
}

/// Match mode and its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMode {
    #[serde(rename = "type")]
    pub kind: ModeKind,
    pub limit: u32,
}

impl Default for GameMode {
    fn default() -> Self {
        Self {
            kind: ModeKind::Moves,
            limit: 50,
        }
    }
}

/// Room lifecycle as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// One member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
    pub score: u64,
    pub moves: u32,
    /// False while the player's connection is detached.
    pub connected: bool,
}

/// Public view of a room. Never exposes the secret itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    pub has_password: bool,
    pub player_count: usize,
    pub max_players: usize,
    #[serde(rename = "gameState")]
    pub status: RoomStatus,
    pub game_mode: GameMode,
    pub players: Vec<PlayerView>,
}

/// Why a player's board stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// A fruit rested above the danger line too long.
    Overflow,
    /// The move or time limit ran out.
    LimitReached,
}

/// Final score line in a `game_end` announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u64,
}

/// Machine-readable error category carried by [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidMessage,
    RoomNotFound,
    RoomFull,
    SecretMismatch,
    NotInRoom,
    NotPlaying,
    /// Ready flags only change before the game starts.
    NotWaiting,
    Storage,
    Internal,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame of every connection.
    Hello { token: String },
    ListRooms,
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        name: String,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        game_mode: Option<GameMode>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        #[serde(default)]
        password: Option<String>,
    },
    LeaveRoom,
    ToggleReady,
    #[serde(rename_all = "camelCase")]
    GameStateUpdate {
        score: u64,
        moves: u32,
        game_state: BoardSnapshot,
        seq: u64,
        /// Bypasses the server-side throttle.
        #[serde(default)]
        forced: bool,
    },
    #[serde(rename_all = "camelCase")]
    FruitDrop {
        x: f32,
        fruit_type: Tier,
        timestamp: u64,
        seq: u64,
    },
    GameOver { score: u64, reason: GameOverReason },
}

impl ClientMessage {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::ListRooms => "list_rooms",
            ClientMessage::CreateRoom { .. } => "create_room",
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom => "leave_room",
            ClientMessage::ToggleReady => "toggle_ready",
            ClientMessage::GameStateUpdate { .. } => "game_state_update",
            ClientMessage::FruitDrop { .. } => "fruit_drop",
            ClientMessage::GameOver { .. } => "game_over",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome { identity: PlayerId, name: String },
    /// Handshake refused. The connection closes after this frame.
    Rejected { reason: String },
    RoomsList { rooms: Vec<RoomView> },
    RoomJoined { room: RoomView },
    RoomUpdate { room: RoomView },
    #[serde(rename_all = "camelCase")]
    GameStart { game_mode: GameMode, room: RoomView },
    #[serde(rename_all = "camelCase")]
    OpponentGameState {
        player_id: PlayerId,
        player_name: String,
        score: u64,
        moves: u32,
        game_state: BoardSnapshot,
        seq: u64,
    },
    #[serde(rename_all = "camelCase")]
    OpponentFruitDrop {
        player_id: PlayerId,
        player_name: String,
        x: f32,
        fruit_type: Tier,
        timestamp: u64,
        seq: u64,
    },
    /// Room finished. `winner` is `None` on a tie.
    GameEnd {
        winner: Option<PlayerId>,
        scores: Vec<FinalScore>,
        room: RoomView,
    },
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Shorthand for an [`ServerMessage::Error`].
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Rejected { .. } => "rejected",
            ServerMessage::RoomsList { .. } => "rooms_list",
            ServerMessage::RoomJoined { .. } => "room_joined",
            ServerMessage::RoomUpdate { .. } => "room_update",
            ServerMessage::GameStart { .. } => "game_start",
            ServerMessage::OpponentGameState { .. } => "opponent_game_state",
            ServerMessage::OpponentFruitDrop { .. } => "opponent_fruit_drop",
            ServerMessage::GameEnd { .. } => "game_end",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Errors produced while encoding or decoding a message body.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize a message into a frame payload.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, MessageError> {
    serde_json::to_vec(msg).map_err(MessageError::Encode)
}

/// Parse a frame payload.
pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(payload).map_err(MessageError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_client(value: serde_json::Value) -> Result<ClientMessage, MessageError> {
        decode_message(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_create_room_defaults() {
        let msg = decode_client(json!({"type": "create_room", "name": "den"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                name: "den".into(),
                password: None,
                game_mode: None,
            }
        );
    }

    #[test]
    fn test_join_room_uses_camel_case() {
        let msg =
            decode_client(json!({"type": "join_room", "roomId": "r1", "password": "pw"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: RoomId::from("r1"),
                password: Some("pw".into()),
            }
        );
    }

    #[test]
    fn test_fruit_drop_fields() {
        let msg = decode_client(json!({
            "type": "fruit_drop", "x": 120.5, "fruitType": 3, "timestamp": 1700, "seq": 4
        }))
        .unwrap();
        let ClientMessage::FruitDrop {
            x,
            fruit_type,
            timestamp,
            seq,
        } = msg
        else {
            panic!("wrong variant: {msg:?}");
        };
        assert_eq!((x, fruit_type, timestamp, seq), (120.5, 3, 1700, 4));
    }

    #[test]
    fn test_state_update_forced_defaults_false() {
        let msg = decode_client(json!({
            "type": "game_state_update", "score": 10, "moves": 2,
            "gameState": {"score": 10}, "seq": 1
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GameStateUpdate { forced: false, .. }
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = decode_client(json!({"type": "launch_rockets"}));
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let result = decode_client(json!({"type": "join_room"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result: Result<ClientMessage, _> = decode_message(b"\x00\x01not json");
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }

    #[test]
    fn test_room_view_wire_shape() {
        let view = RoomView {
            id: RoomId::from("r1"),
            name: "den".into(),
            has_password: true,
            player_count: 1,
            max_players: 2,
            status: RoomStatus::Waiting,
            game_mode: GameMode::default(),
            players: vec![PlayerView {
                id: PlayerId::from("alice"),
                name: "Alice".into(),
                ready: false,
                score: 0,
                moves: 0,
                connected: true,
            }],
        };
        let value = serde_json::to_value(ServerMessage::RoomUpdate { room: view }).unwrap();
        assert_eq!(value["type"], "room_update");
        assert_eq!(value["room"]["hasPassword"], true);
        assert_eq!(value["room"]["gameState"], "waiting");
        assert_eq!(value["room"]["gameMode"], json!({"type": "moves", "limit": 50}));
        assert_eq!(value["room"]["players"][0]["id"], "alice");
    }

    #[test]
    fn test_error_envelope_shape() {
        let value =
            serde_json::to_value(ServerMessage::error(ErrorCode::RoomFull, "room is full")).unwrap();
        assert_eq!(value, json!({"type": "error", "code": "room_full", "message": "room is full"}));
    }

    #[test]
    fn test_kind_matches_tag() {
        let msg = ClientMessage::ToggleReady;
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());

        let msg = ServerMessage::RoomsList { rooms: vec![] };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }
}
