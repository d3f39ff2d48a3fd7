//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::http::{RegistryStateDto, RoomOccupancyDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Debug endpoint exposing the registry's current shape (for testing purposes)
pub async fn debug_registry_state(State(state): State<Arc<AppState>>) -> Json<RegistryStateDto> {
    let connections = state.registry.connection_count().await;

    let mut rooms = Vec::new();
    for (room_id, members) in state.registry.occupancy().await {
        let typing_user_ids = state
            .registry
            .typing_users(room_id)
            .await
            .into_iter()
            .map(|id| id.value())
            .collect();
        // Domain Model から DTO への変換
        rooms.push(RoomOccupancyDto {
            room_id: room_id.value(),
            members,
            typing_user_ids,
        });
    }

    Json(RegistryStateDto { connections, rooms })
}
