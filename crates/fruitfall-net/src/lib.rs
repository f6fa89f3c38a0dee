//! TCP networking for Fruitfall: length-prefixed JSON framing, the wire
//! message set, bearer-token handshake, per-connection sessions, and the
//! server/client pair with reconnection.

pub mod auth;
pub mod framing;
pub mod messages;
pub mod reconnection;
pub mod session;
pub mod tcp_client;
pub mod tcp_server;

pub use auth::{AuthError, CredentialVerifier, Credentials, StaticTokenVerifier};
pub use framing::{FrameConfig, FrameError, read_frame, read_message, write_frame, write_message};
pub use messages::{
    ClientMessage, ErrorCode, FinalScore, GameMode, GameOverReason, MessageError, ModeKind,
    PlayerId, PlayerView, RoomId, RoomStatus, RoomView, ServerMessage, decode_message,
    encode_message,
};
pub use reconnection::{ReconnectConfig, ReconnectError, ReconnectState, reconnect_loop};
pub use session::{ConnectionId, ConnectionSession, IdGenerator, SendOutcome};
pub use tcp_client::{ClientError, ConnectionState, ConnectionStateWatch, GameClient};
pub use tcp_server::{
    ConnectionHandler, ConnectionLimitReached, ConnectionMap, GameServer, ServerConfig,
};
