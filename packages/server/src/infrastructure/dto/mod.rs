//! Data Transfer Objects (DTOs) for the chat hub.
//!
//! DTOs are organized by protocol:
//! - `websocket`: event envelopes exchanged over the socket, plus the codec
//! - `http`: HTTP API response DTOs

pub mod conversion;
pub mod http;
pub mod websocket;
