//! Infrastructure layer: wire format, the in-memory store and the
//! connection registry.

pub mod dto;
pub mod registry;
pub mod repository;
