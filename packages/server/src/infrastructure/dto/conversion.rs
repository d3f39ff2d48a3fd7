//! Conversion logic between DTOs and domain entities.

use crate::domain::{Message, UserId};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Message> for dto::MessagePayload {
    fn from(model: &Message) -> Self {
        Self {
            id: model.id.value(),
            room_id: model.room_id.value(),
            sender_id: model.sender_id.value(),
            content: model.content.as_str().to_string(),
            reply_to_id: model.reply_to_id.map(|id| id.value()),
            created_at: model.created_at,
        }
    }
}

impl From<Message> for dto::MessagePayload {
    fn from(model: Message) -> Self {
        Self::from(&model)
    }
}

/// Build a `history` event from messages already in chronological order
pub fn history_event(messages: &[Message]) -> dto::ServerEvent {
    dto::ServerEvent::History(dto::HistoryPayload {
        messages: messages.iter().map(dto::MessagePayload::from).collect(),
    })
}

/// Build a `typing` event from the users currently typing
pub fn typing_event(user_ids: &[UserId]) -> dto::ServerEvent {
    dto::ServerEvent::Typing(dto::TypingPayload {
        user_ids: user_ids.iter().map(|id| id.value()).collect(),
    })
}
