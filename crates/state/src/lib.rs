//! Conversation state storage: a `(state, data)` record per conversation key.

pub mod error;
pub mod key;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    key::PersistenceKey,
    sqlite::{SqliteConversationStore, run_migrations},
    store::{ConversationData, ConversationRecord, ConversationStore, MemoryConversationStore},
};
