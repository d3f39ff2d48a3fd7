//! UseCase: コネクション切断（Evict）
//!
//! reader / writer のどちらの loop が終了しても呼ばれるため、2 回目以降の
//! 呼び出しは何もしません。

use std::sync::Arc;

use crate::{domain::ConnectionContext, infrastructure::registry::RoomRegistry};

/// コネクション切断のユースケース
pub struct DisconnectParticipantUseCase {
    registry: Arc<RoomRegistry>,
}

impl DisconnectParticipantUseCase {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// コネクションを登録解除し、所属 Room から外す
    ///
    /// # Returns
    ///
    /// このコールで実際に登録解除した場合は `true`
    pub async fn execute(&self, context: &ConnectionContext) -> bool {
        let room_id = self.registry.room_of(&context.id).await;
        let removed = self.registry.evict(&context.id).await;
        if removed {
            match room_id {
                Some(room_id) => tracing::info!(
                    "Connection '{}' (user {}) disconnected from room {}",
                    context.id,
                    context.user_id,
                    room_id
                ),
                None => tracing::info!(
                    "Connection '{}' (user {}) disconnected",
                    context.id,
                    context.user_id
                ),
            }
        }
        removed
    }
}
