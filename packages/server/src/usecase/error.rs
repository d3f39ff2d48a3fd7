//! UseCase errors.
//!
//! `Display` of these errors is exactly what the client receives in the
//! `message` field of an `error` event.

use thiserror::Error;

use crate::{
    domain::{RepositoryError, RoomId, ValueObjectError},
    infrastructure::dto::websocket::CodecError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRoomError {
    #[error("failed to join room: {0}")]
    InvalidRoomId(ValueObjectError),

    #[error("failed to join room: room {0} not found")]
    RoomNotFound(RoomId),

    #[error("failed to join room: {0}")]
    Store(RepositoryError),

    #[error("failed to join room: connection is no longer registered")]
    ConnectionGone,

    #[error("failed to load history: {0}")]
    History(RepositoryError),

    #[error("failed to encode history: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("must join a room before sending messages")]
    NotInRoom,

    #[error("reply target {0} not found in this room")]
    ReplyTargetNotFound(i64),

    #[error("failed to look up reply target: {0}")]
    ReplyLookup(RepositoryError),

    #[error("failed to save message: {0}")]
    Persist(RepositoryError),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypingError {
    #[error("must join a room first")]
    NotInRoom,

    #[error("failed to encode typing event: {0}")]
    Encode(String),
}

/// Anything that can go wrong while handling one inbound event.
///
/// None of these close the connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    JoinRoom(#[from] JoinRoomError),

    #[error(transparent)]
    SendMessage(#[from] SendMessageError),

    #[error(transparent)]
    Typing(#[from] TypingError),

    #[error(transparent)]
    InvalidPayload(CodecError),

    #[error("unknown event type: {0}")]
    UnknownEvent(String),
}
