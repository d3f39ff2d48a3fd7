//! UseCase: コネクション受け入れ（Admit）
//!
//! 認証済みのユーザー ID からコネクションを生成し、RoomRegistry に登録します。
//! この時点ではどの Room にも所属しません。

use std::sync::Arc;

use crate::{
    domain::{Connection, ConnectionContext, OutboundReceiver, UserId},
    infrastructure::registry::RoomRegistry,
};

/// コネクション受け入れのユースケース
pub struct ConnectParticipantUseCase {
    registry: Arc<RoomRegistry>,
    /// 1 コネクションあたりの送信キュー容量
    outbound_capacity: usize,
}

impl ConnectParticipantUseCase {
    pub fn new(registry: Arc<RoomRegistry>, outbound_capacity: usize) -> Self {
        Self {
            registry,
            outbound_capacity,
        }
    }

    /// コネクションを生成して登録
    ///
    /// # Returns
    ///
    /// 生成したコネクションの識別情報と、writer loop が読む送信キューの受信側
    pub async fn execute(&self, user_id: UserId) -> (ConnectionContext, OutboundReceiver) {
        let (connection, receiver) = Connection::open(user_id, self.outbound_capacity);
        let context = connection.context();
        self.registry.admit(connection).await;
        tracing::info!("Connection '{}' admitted for user {}", context.id, user_id);
        (context, receiver)
    }
}
