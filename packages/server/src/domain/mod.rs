//! Domain layer: value objects, entities and the persistence interface.
//!
//! Nothing in here knows about sockets or JSON. The only runtime type that
//! leaks in is the outbound queue of a connection (`connection` module),
//! which is the seam the registry fans out through.

pub mod connection;
pub mod entity;
pub mod error;
pub mod repository;
pub mod value_object;

pub use connection::{Connection, ConnectionContext, OutboundReceiver, OutboundSender};
pub use entity::{Message, NewMessage, Participant, ParticipantRole, Room, RoomKind, User};
pub use error::{PushError, RepositoryError, ValueObjectError};
pub use repository::ChatStore;
pub use value_object::{ConnectionId, ConnectionIdFactory, MessageContent, MessageId, RoomId, UserId};

#[cfg(test)]
pub use repository::MockChatStore;
