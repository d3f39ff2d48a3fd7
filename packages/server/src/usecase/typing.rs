//! UseCase: 入力中（typing）通知
//!
//! typing を受け取るたびに現在入力中のユーザー一覧を計算し直し、
//! Room 全体にブロードキャストします。間引きは 3 秒の有効期限のみです。

use std::sync::Arc;

use crate::{
    domain::{ConnectionContext, UserId},
    infrastructure::{dto::conversion::typing_event, registry::RoomRegistry},
};

use super::error::TypingError;

/// typing 通知のユースケース
pub struct TypingUseCase {
    registry: Arc<RoomRegistry>,
}

impl TypingUseCase {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// typing を記録してブロードキャスト
    ///
    /// # Returns
    ///
    /// ブロードキャストした入力中ユーザーの一覧
    pub async fn execute(&self, context: &ConnectionContext) -> Result<Vec<UserId>, TypingError> {
        let room_id = self
            .registry
            .room_of(&context.id)
            .await
            .ok_or(TypingError::NotInRoom)?;

        self.registry.set_typing(room_id, context.user_id).await;
        let typing_users = self.registry.typing_users(room_id).await;

        let json = typing_event(&typing_users)
            .encode()
            .map_err(|e| TypingError::Encode(e.to_string()))?;
        self.registry.broadcast(room_id, &json).await;

        Ok(typing_users)
    }
}
