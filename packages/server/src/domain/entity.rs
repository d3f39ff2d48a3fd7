//! Entities returned by the chat store.

use chrono::{DateTime, Utc};

use super::value_object::{MessageContent, MessageId, RoomId, UserId};

/// Kind of room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Group,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub kind: RoomKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
}

/// Role of a user inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticipantRole {
    /// Assigned when a user first joins a room over a live connection
    #[default]
    Member,
    Admin,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Member => "member",
            ParticipantRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deleted messages never appear in history
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A message that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub reply_to_id: Option<MessageId>,
}
