//! UseCase layer.
//!
//! One use case per inbound event plus connection admission and eviction.
//! `EventDispatcher` routes decoded events to them and reports failures back
//! to the originating connection.

mod connect_participant;
mod disconnect_participant;
mod dispatch_event;
mod error;
mod join_room;
mod send_message;
mod typing;

pub use connect_participant::ConnectParticipantUseCase;
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use dispatch_event::EventDispatcher;
pub use error::{DispatchError, JoinRoomError, SendMessageError, TypingError};
pub use join_room::JoinRoomUseCase;
pub use send_message::SendMessageUseCase;
pub use typing::TypingUseCase;
