//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// Room occupancy as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOccupancyDto {
    pub room_id: i64,
    pub members: usize,
    pub typing_user_ids: Vec<i64>,
}

/// Response of `GET /debug/registry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStateDto {
    pub connections: usize,
    pub rooms: Vec<RoomOccupancyDto>,
}
