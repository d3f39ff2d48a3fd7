//! Shared utilities for the Hiroba chat hub.

pub mod logger;
pub mod time;
