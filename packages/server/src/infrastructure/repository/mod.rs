//! ChatStore implementations.

pub mod inmemory;

pub use inmemory::InMemoryChatStore;
