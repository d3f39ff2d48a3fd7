//! ChatStore trait 定義
//!
//! ハブが必要とする永続化層へのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! 各メソッドは外部ストアを待つ可能性があるため、RoomRegistry のロックを
//! 保持したまま呼び出してはいけません。

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{
    Message, MessageId, NewMessage, ParticipantRole, RepositoryError, Room, RoomId, User, UserId,
};

/// 部屋・ユーザー・メッセージを保持する永続ストア
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Room を取得（存在しなければ `RepositoryError::RoomNotFound`）
    async fn find_room(&self, room_id: RoomId) -> Result<Room, RepositoryError>;

    /// ユーザーを取得し、未登録なら作成する
    async fn find_or_create_user(&self, user_id: UserId) -> Result<User, RepositoryError>;

    /// Room にそのユーザーの参加レコードが何件あるか
    async fn count_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<usize, RepositoryError>;

    /// 参加レコードを追加
    async fn add_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: ParticipantRole,
    ) -> Result<(), RepositoryError>;

    /// メッセージを保存し、ID と作成時刻が付与されたレコードを返す
    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// メッセージを ID で取得（削除済みも含む）
    async fn find_message(&self, message_id: MessageId) -> Result<Message, RepositoryError>;

    /// 削除されていない最新メッセージを新しい順に最大 `limit` 件取得
    async fn list_recent_messages(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;
}
