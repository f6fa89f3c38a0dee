//! Room and dispatch error types.

use fruitfall_net::{ErrorCode, RoomId};

use crate::store::StoreError;

/// Errors from [`RoomRegistry`](crate::RoomRegistry) operations. None of them
/// mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("wrong password for room {0}")]
    SecretMismatch(RoomId),

    #[error("room {0} already exists")]
    RoomExists(RoomId),

    #[error("not in a room")]
    NotInRoom,

    #[error("room {0} is not playing")]
    NotPlaying(RoomId),

    #[error("room {0} has already started")]
    NotWaiting(RoomId),
}

/// Anything that turns an inbound envelope into an `error` reply.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Invalid(String),

    #[error("internal error")]
    Internal,
}

impl DispatchError {
    /// Stable code sent to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Room(RoomError::RoomNotFound(_)) => ErrorCode::RoomNotFound,
            DispatchError::Room(RoomError::RoomFull(_)) => ErrorCode::RoomFull,
            DispatchError::Room(RoomError::SecretMismatch(_)) => ErrorCode::SecretMismatch,
            DispatchError::Room(RoomError::NotInRoom) => ErrorCode::NotInRoom,
            DispatchError::Room(RoomError::NotPlaying(_)) => ErrorCode::NotPlaying,
            DispatchError::Room(RoomError::NotWaiting(_)) => ErrorCode::NotWaiting,
            DispatchError::Room(RoomError::RoomExists(_)) | DispatchError::Store(_) => {
                ErrorCode::Storage
            }
            DispatchError::Invalid(_) => ErrorCode::InvalidMessage,
            DispatchError::Internal => ErrorCode::Internal,
        }
    }
}
