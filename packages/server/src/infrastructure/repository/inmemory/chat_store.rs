//! InMemory ChatStore 実装
//!
//! ドメイン層が定義する ChatStore trait の具体的な実装。
//! HashMap / Vec をインメモリ DB として使用します。
//! ID は 1 から連番で採番され、作成時刻は注入された Clock から取得します。

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use hiroba_shared::time::{Clock, millis_to_datetime};
use tokio::sync::Mutex;

use crate::domain::{
    ChatStore, Message, MessageId, NewMessage, Participant, ParticipantRole, RepositoryError, Room,
    RoomId, RoomKind, User, UserId,
};

#[derive(Debug, Default)]
struct StoreState {
    rooms: BTreeMap<RoomId, Room>,
    users: HashSet<UserId>,
    participants: HashMap<(RoomId, UserId), Participant>,
    messages: Vec<Message>,
    last_room_id: i64,
    last_message_id: i64,
}

/// インメモリ ChatStore 実装
pub struct InMemoryChatStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryChatStore {
    /// 新しい InMemoryChatStore を作成
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    /// Room を作成（起動時のシードやテストで使用）
    pub async fn create_room(
        &self,
        name: impl Into<String>,
        kind: RoomKind,
    ) -> Result<Room, RepositoryError> {
        let created_at = millis_to_datetime(self.clock.now_millis());
        let mut state = self.state.lock().await;
        let id = RoomId::new(state.last_room_id + 1)
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        state.last_room_id = id.value();
        let room = Room {
            id,
            name: name.into(),
            kind,
            created_at,
        };
        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    /// メッセージを論理削除（履歴に出なくなる）
    pub async fn delete_message(&self, message_id: MessageId) -> Result<(), RepositoryError> {
        let deleted_at = millis_to_datetime(self.clock.now_millis());
        let mut state = self.state.lock().await;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(RepositoryError::MessageNotFound(message_id))?;
        message.deleted_at.get_or_insert(deleted_at);
        Ok(())
    }

    /// 全 Room を ID 順に取得
    pub async fn rooms(&self) -> Vec<Room> {
        let state = self.state.lock().await;
        state.rooms.values().cloned().collect()
    }

    /// 参加レコードを取得
    pub async fn participant(&self, room_id: RoomId, user_id: UserId) -> Option<Participant> {
        let state = self.state.lock().await;
        state.participants.get(&(room_id, user_id)).cloned()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_room(&self, room_id: RoomId) -> Result<Room, RepositoryError> {
        let state = self.state.lock().await;
        state
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(RepositoryError::RoomNotFound(room_id))
    }

    async fn find_or_create_user(&self, user_id: UserId) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.insert(user_id) {
            tracing::debug!("User {} created on first room interaction", user_id);
        }
        Ok(User { id: user_id })
    }

    async fn count_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<usize, RepositoryError> {
        let state = self.state.lock().await;
        Ok(usize::from(state.participants.contains_key(&(room_id, user_id))))
    }

    async fn add_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: ParticipantRole,
    ) -> Result<(), RepositoryError> {
        let joined_at = millis_to_datetime(self.clock.now_millis());
        let mut state = self.state.lock().await;
        if !state.rooms.contains_key(&room_id) {
            return Err(RepositoryError::RoomNotFound(room_id));
        }
        // (room_id, user_id) is unique; a second insert keeps the first record
        state
            .participants
            .entry((room_id, user_id))
            .or_insert(Participant {
                room_id,
                user_id,
                role,
                joined_at,
            });
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let created_at = millis_to_datetime(self.clock.now_millis());
        let mut state = self.state.lock().await;
        if !state.rooms.contains_key(&message.room_id) {
            return Err(RepositoryError::RoomNotFound(message.room_id));
        }
        let id = MessageId::new(state.last_message_id + 1)
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        state.last_message_id = id.value();
        let stored = Message {
            id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content,
            reply_to_id: message.reply_to_id,
            created_at,
            deleted_at: None,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn find_message(&self, message_id: MessageId) -> Result<Message, RepositoryError> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or(RepositoryError::MessageNotFound(message_id))
    }

    async fn list_recent_messages(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.lock().await;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id && !m.is_deleted())
            .cloned()
            .collect();
        messages.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        messages.truncate(limit);
        Ok(messages)
    }
}
