//! InMemory ChatStore 実装

mod chat_store;

pub use chat_store::InMemoryChatStore;
