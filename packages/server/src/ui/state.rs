//! Shared application state.

use std::sync::Arc;

use crate::{
    config::HubConfig,
    infrastructure::registry::RoomRegistry,
    usecase::{ConnectParticipantUseCase, DisconnectParticipantUseCase, EventDispatcher},
};

/// Shared application state
pub struct AppState {
    /// ConnectParticipantUseCase（コネクション受け入れのユースケース）
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// DisconnectParticipantUseCase（コネクション切断のユースケース）
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    /// EventDispatcher（受信イベントの振り分け）
    pub dispatcher: Arc<EventDispatcher>,
    /// RoomRegistry（デバッグ用の状態参照）
    pub registry: Arc<RoomRegistry>,
    pub config: HubConfig,
}
