//! Chat history persistence
//!
//! Provides:
//! - `InMemoryChatHistory`: process-local `ChatHistoryStore` with
//!   per-instance serialized appends and a 50-turn cap

pub mod chat_history;
pub mod error;

pub use chat_history::InMemoryChatHistory;
pub use error::PersistenceError;
