//! Hiroba: room-based real-time chat hub.
//!
//! Accepts authenticated WebSocket connections, moves each one between
//! rooms, persists messages through a [`domain::ChatStore`] and fans events
//! out to every member of a room without letting one slow socket stall the
//! others.
//!
//! Layers:
//! - [`domain`]: value objects, entities, the store trait and the outbound queue
//! - [`infrastructure`]: wire format, the in-memory store, the room registry
//! - [`usecase`]: admit, evict, join, send, typing and event routing
//! - [`ui`]: axum router and the per-connection reader/writer loops

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
