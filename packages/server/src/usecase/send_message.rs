//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 入力検証（空メッセージ・未参加・返信先）、永続化、Room へのブロードキャスト
//!
//! ### なぜこのテストが必要か
//! - 保存されたレコード（サーバー採番の ID と作成時刻）から new_message が作られること
//! - 送信者を含む Room の全メンバーに届くこと
//! - ストア障害時に何もブロードキャストされないこと
//!
//! ### どのような状況を想定しているか
//! - 正常系：送信と返信
//! - 異常系：空メッセージ、Room 未参加、別 Room のメッセージへの返信、ストア障害

use std::sync::Arc;

use crate::{
    domain::{
        ChatStore, ConnectionContext, Message, MessageContent, MessageId, NewMessage,
        RepositoryError, RoomId,
    },
    infrastructure::{dto::websocket::ServerEvent, registry::RoomRegistry},
};

use super::error::SendMessageError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    store: Arc<dyn ChatStore>,
    registry: Arc<RoomRegistry>,
}

impl SendMessageUseCase {
    pub fn new(store: Arc<dyn ChatStore>, registry: Arc<RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `context` - 送信元コネクション
    /// * `content` - メッセージ本文
    /// * `reply_to_id` - 返信先メッセージ ID（同じ Room のもののみ）
    ///
    /// # Returns
    ///
    /// * `Ok(Message)` - 保存されたメッセージ
    /// * `Err(SendMessageError)` - 送信失敗（何もブロードキャストされない）
    pub async fn execute(
        &self,
        context: &ConnectionContext,
        content: String,
        reply_to_id: Option<i64>,
    ) -> Result<Message, SendMessageError> {
        let content = MessageContent::new(content).map_err(|_| SendMessageError::EmptyContent)?;

        let room_id = self
            .registry
            .room_of(&context.id)
            .await
            .ok_or(SendMessageError::NotInRoom)?;

        let reply_to_id = match reply_to_id {
            Some(raw) => Some(self.resolve_reply_target(room_id, raw).await?),
            None => None,
        };

        let message = self
            .store
            .create_message(NewMessage {
                room_id,
                sender_id: context.user_id,
                content,
                reply_to_id,
            })
            .await
            .map_err(SendMessageError::Persist)?;

        let json = ServerEvent::NewMessage((&message).into())
            .encode()
            .map_err(|e| SendMessageError::Encode(e.to_string()))?;
        let report = self.registry.broadcast(room_id, &json).await;
        tracing::debug!(
            "Message {} from user {} fanned out to {} member(s) of room {} ({} dropped)",
            message.id,
            context.user_id,
            report.delivered,
            room_id,
            report.dropped.len()
        );

        Ok(message)
    }

    /// 返信先が同じ Room の削除されていないメッセージであることを確認
    async fn resolve_reply_target(
        &self,
        room_id: RoomId,
        raw: i64,
    ) -> Result<MessageId, SendMessageError> {
        let id = MessageId::new(raw).map_err(|_| SendMessageError::ReplyTargetNotFound(raw))?;
        match self.store.find_message(id).await {
            Ok(target) if target.room_id == room_id && !target.is_deleted() => Ok(id),
            Ok(_) | Err(RepositoryError::MessageNotFound(_)) => {
                Err(SendMessageError::ReplyTargetNotFound(raw))
            }
            Err(e) => Err(SendMessageError::ReplyLookup(e)),
        }
    }
}
