//! Chat history gateway

use async_trait::async_trait;

use crate::{ChatInstance, ChatTurn, Result};

/// Append-only turn persistence.
///
/// Appends to one instance must be serialized by the implementation.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync + 'static {
    /// Append a turn and return the instance id it landed in.
    ///
    /// With no `instance_id` the turn opens a new instance.
    async fn append(&self, user_id: &str, instance_id: Option<&str>, turn: ChatTurn)
        -> Result<String>;

    async fn update_title(&self, instance_id: &str, title: &str) -> Result<()>;

    /// Set the title only while the current one is generic, checked and
    /// written under the instance's append lock. Returns whether it was set.
    async fn set_title_if_generic(&self, instance_id: &str, title: &str) -> Result<bool>;

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ChatInstance>>;

    /// Up to `limit` most recent turns, oldest first
    async fn recent_turns(&self, instance_id: &str, limit: usize) -> Result<Vec<ChatTurn>>;
}
