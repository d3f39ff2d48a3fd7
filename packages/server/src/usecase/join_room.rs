//! UseCase: Room への参加（join_room）
//!
//! ## 処理の流れ
//!
//! 1. ストアで Room の存在を確認
//! 2. ユーザーが未登録なら作成、Room の参加レコードが無ければ member として追加
//! 3. RoomRegistry 上で前の Room から新しい Room へ所属を移す
//! 4. 最新 N 件の履歴を古い順に並べ替え、参加したコネクションにだけ送る
//!
//! 1〜2 はストアを待つため RoomRegistry のロック外で行い、
//! 所属の付け替え（3）だけをロック内で行います。

use std::sync::Arc;

use crate::{
    domain::{
        ChatStore, ConnectionContext, Message, ParticipantRole, PushError, RepositoryError, RoomId,
    },
    infrastructure::{dto::conversion::history_event, registry::RoomRegistry},
};

use super::error::JoinRoomError;

/// Room 参加のユースケース
pub struct JoinRoomUseCase {
    store: Arc<dyn ChatStore>,
    registry: Arc<RoomRegistry>,
    /// join 時に送る履歴の件数
    history_limit: usize,
}

impl JoinRoomUseCase {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: Arc<RoomRegistry>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            registry,
            history_limit,
        }
    }

    /// Room への参加を実行
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Message>)` - 送信した履歴（古い順）
    /// * `Err(JoinRoomError)` - 参加失敗（所属は変わらない）
    pub async fn execute(
        &self,
        context: &ConnectionContext,
        room_id: RoomId,
    ) -> Result<Vec<Message>, JoinRoomError> {
        // 1. Room の存在確認
        self.store.find_room(room_id).await.map_err(|e| match e {
            RepositoryError::RoomNotFound(id) => JoinRoomError::RoomNotFound(id),
            other => JoinRoomError::Store(other),
        })?;

        // 2. ユーザーと参加レコードを遅延作成
        self.store
            .find_or_create_user(context.user_id)
            .await
            .map_err(JoinRoomError::Store)?;
        let count = self
            .store
            .count_participant(room_id, context.user_id)
            .await
            .map_err(JoinRoomError::Store)?;
        if count == 0 {
            self.store
                .add_participant(room_id, context.user_id, ParticipantRole::default())
                .await
                .map_err(JoinRoomError::Store)?;
            tracing::info!(
                "User {} added to room {} as {}",
                context.user_id,
                room_id,
                ParticipantRole::default().as_str()
            );
        }

        // 3. 所属の付け替え
        let previous = self
            .registry
            .join_room(&context.id, room_id)
            .await
            .map_err(|_| JoinRoomError::ConnectionGone)?;
        tracing::info!(
            "Connection '{}' (user {}) joined room {} (previous: {:?})",
            context.id,
            context.user_id,
            room_id,
            previous.map(|id| id.value())
        );

        // 4. 履歴の送信
        let mut history = self
            .store
            .list_recent_messages(room_id, self.history_limit)
            .await
            .map_err(JoinRoomError::History)?;
        history.reverse();

        let json = history_event(&history)
            .encode()
            .map_err(|e| JoinRoomError::Encode(e.to_string()))?;
        match self.registry.push_to(&context.id, json).await {
            Ok(()) => {}
            Err(PushError::QueueFull) => tracing::warn!(
                "Failed to send history to connection '{}', queue full",
                context.id
            ),
            Err(e) => tracing::debug!("History for connection '{}' not sent: {}", context.id, e),
        }

        Ok(history)
    }
}
