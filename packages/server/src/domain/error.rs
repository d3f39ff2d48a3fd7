//! Domain errors.

use thiserror::Error;

use super::value_object::{MessageId, RoomId};

/// Value object construction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{kind} must be positive, got {value}")]
    NonPositiveId { kind: &'static str, value: i64 },

    #[error("message content cannot be empty")]
    EmptyContent,
}

/// Errors surfaced by a `ChatStore` implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// The backing store could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure to enqueue a frame on a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("outbound queue is closed")]
    Closed,

    #[error("connection is not registered")]
    NotRegistered,
}
