//! In-memory chat history
//!
//! Each instance sits behind its own async mutex so appends to one
//! conversation are serialized while different conversations proceed
//! independently. An append without an instance id opens a new conversation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use advisor_config::constants::history;
use advisor_core::{is_generic_title, ChatHistoryStore, ChatInstance, ChatTurn, Result};

use crate::PersistenceError;

/// Longest title accepted by `update_title`, in characters
const MAX_TITLE_CHARS: usize = 120;

pub struct InMemoryChatHistory {
    instances: DashMap<String, Arc<Mutex<ChatInstance>>>,
    max_turns: usize,
}

impl InMemoryChatHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            instances: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn slot(&self, instance_id: &str) -> Option<Arc<Mutex<ChatInstance>>> {
        self.instances.get(instance_id).map(|entry| entry.value().clone())
    }

    /// Existing instance, or a new one under the caller's id
    fn slot_or_create(&self, user_id: &str, instance_id: &str) -> Arc<Mutex<ChatInstance>> {
        self.instances
            .entry(instance_id.to_string())
            .or_insert_with(|| {
                let mut instance = ChatInstance::new(user_id);
                instance.id = instance_id.to_string();
                tracing::debug!(instance_id, user_id, "Chat instance created");
                Arc::new(Mutex::new(instance))
            })
            .value()
            .clone()
    }

    fn create(&self, user_id: &str) -> Arc<Mutex<ChatInstance>> {
        let instance = ChatInstance::new(user_id);
        let id = instance.id.clone();
        tracing::debug!(instance_id = %id, user_id, "Chat instance created");
        let slot = Arc::new(Mutex::new(instance));
        self.instances.insert(id, slot.clone());
        slot
    }
}

fn valid_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(PersistenceError::InvalidTitle(title.to_string()).into());
    }
    Ok(title)
}

impl Default for InMemoryChatHistory {
    fn default() -> Self {
        Self::new(history::MAX_TURNS)
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistory {
    async fn append(
        &self,
        user_id: &str,
        instance_id: Option<&str>,
        turn: ChatTurn,
    ) -> Result<String> {
        let slot = match instance_id {
            Some(id) => self.slot_or_create(user_id, id),
            None => self.create(user_id),
        };

        let mut instance = slot.lock().await;
        if instance.user_id != user_id {
            return Err(PersistenceError::Forbidden {
                instance_id: instance.id.clone(),
            }
            .into());
        }
        instance.push_turn(turn, self.max_turns);
        Ok(instance.id.clone())
    }

    async fn update_title(&self, instance_id: &str, title: &str) -> Result<()> {
        let title = valid_title(title)?;
        let slot = self
            .slot(instance_id)
            .ok_or_else(|| PersistenceError::NotFound(instance_id.to_string()))?;

        let mut instance = slot.lock().await;
        instance.title = title.to_string();
        instance.updated_at = Utc::now();
        Ok(())
    }

    async fn set_title_if_generic(&self, instance_id: &str, title: &str) -> Result<bool> {
        let title = valid_title(title)?;
        let slot = self
            .slot(instance_id)
            .ok_or_else(|| PersistenceError::NotFound(instance_id.to_string()))?;

        let mut instance = slot.lock().await;
        if !is_generic_title(&instance.title) {
            return Ok(false);
        }
        instance.title = title.to_string();
        instance.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ChatInstance>> {
        match self.slot(instance_id) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn recent_turns(&self, instance_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let Some(slot) = self.slot(instance_id) else {
            return Ok(Vec::new());
        };
        let instance = slot.lock().await;
        let skip = instance.turns.len().saturating_sub(limit);
        Ok(instance.turns[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::{ChatRole, DEFAULT_TITLE};

    #[tokio::test]
    async fn test_append_without_id_opens_new_instance() {
        let store = InMemoryChatHistory::new(50);
        let first = store.append("u1", None, ChatTurn::user("hi")).await.unwrap();
        let second = store.append("u1", None, ChatTurn::user("new topic")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);

        let instance = store.get_instance(&second).await.unwrap().unwrap();
        assert_eq!(instance.turns.len(), 1);
        assert_eq!(instance.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_explicit_id_creates_instance() {
        let store = InMemoryChatHistory::new(50);
        let id = store
            .append("u1", Some("chat-7"), ChatTurn::user("hi"))
            .await
            .unwrap();
        assert_eq!(id, "chat-7");

        let instance = store.get_instance("chat-7").await.unwrap().unwrap();
        assert_eq!(instance.title, DEFAULT_TITLE);
        assert_eq!(instance.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_turns_are_capped() {
        let store = InMemoryChatHistory::new(4);
        for i in 0..10 {
            store
                .append("u1", Some("c"), ChatTurn::user(format!("m{}", i)))
                .await
                .unwrap();
        }
        let instance = store.get_instance("c").await.unwrap().unwrap();
        assert_eq!(instance.turns.len(), 4);
        assert_eq!(instance.turns[0].content, "m6");
    }

    #[tokio::test]
    async fn test_recent_turns_oldest_first() {
        let store = InMemoryChatHistory::new(50);
        store.append("u1", Some("c"), ChatTurn::user("q1")).await.unwrap();
        store.append("u1", Some("c"), ChatTurn::assistant("a1")).await.unwrap();
        store.append("u1", Some("c"), ChatTurn::user("q2")).await.unwrap();

        let turns = store.recent_turns("c", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::Assistant);
        assert_eq!(turns[1].content, "q2");
        assert!(store.recent_turns("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_instance_rejected() {
        let store = InMemoryChatHistory::new(50);
        store.append("u1", Some("c"), ChatTurn::user("mine")).await.unwrap();
        let err = store
            .append("u2", Some("c"), ChatTurn::user("not mine"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "history");
    }

    #[tokio::test]
    async fn test_update_title() {
        let store = InMemoryChatHistory::new(50);
        store.append("u1", Some("c"), ChatTurn::user("q")).await.unwrap();
        store.update_title("c", "  Hiring Plan ").await.unwrap();
        let instance = store.get_instance("c").await.unwrap().unwrap();
        assert_eq!(instance.title, "Hiring Plan");

        assert!(store.update_title("missing", "x").await.is_err());
        assert!(store.update_title("c", "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_title_set_only_while_generic() {
        let store = InMemoryChatHistory::new(50);
        store.append("u1", Some("c"), ChatTurn::user("q")).await.unwrap();

        assert!(store.set_title_if_generic("c", "Hiring Plan").await.unwrap());
        assert!(!store.set_title_if_generic("c", "Cash Flow").await.unwrap());
        let instance = store.get_instance("c").await.unwrap().unwrap();
        assert_eq!(instance.title, "Hiring Plan");
    }
}
