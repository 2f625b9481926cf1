//! Chat history types: turns, instances and generic-title detection.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Title given to instances created by the pipeline.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Placeholder titles that may be replaced by an auto-generated one.
pub const GENERIC_TITLES: &[&str] = &[
    "New Chat",
    "New Conversation",
    "Untitled",
    "Chat",
    "Voice Chat",
    "Untitled Chat",
];

static GENERIC_TITLE_SET: Lazy<HashSet<String>> =
    Lazy::new(|| GENERIC_TITLES.iter().map(|t| t.to_lowercase()).collect());

/// Case-insensitive check against the placeholder list. Empty titles count as generic.
pub fn is_generic_title(title: &str) -> bool {
    let trimmed = title.trim();
    trimmed.is_empty() || GENERIC_TITLE_SET.contains(&trimmed.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One conversation. Turns are append-only and capped by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInstance {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub turns: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatInstance {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: DEFAULT_TITLE.to_string(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_generic_title(&self) -> bool {
        is_generic_title(&self.title)
    }

    /// Append and drop the oldest turns beyond `max_turns`.
    pub fn push_turn(&mut self, turn: ChatTurn, max_turns: usize) {
        self.updated_at = turn.timestamp;
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn first_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == ChatRole::User)
            .map(|t| t.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_titles_case_insensitive() {
        assert!(is_generic_title("new chat"));
        assert!(is_generic_title("VOICE CHAT"));
        assert!(is_generic_title("  Untitled "));
        assert!(is_generic_title(""));
        assert!(!is_generic_title("Quarterly hiring plan"));
    }

    #[test]
    fn test_push_turn_caps_history() {
        let mut instance = ChatInstance::new("u1");
        for i in 0..7 {
            instance.push_turn(ChatTurn::user(format!("m{}", i)), 5);
        }
        assert_eq!(instance.turns.len(), 5);
        assert_eq!(instance.turns[0].content, "m2");
        assert_eq!(instance.turns[4].content, "m6");
    }

    #[test]
    fn test_new_instance_has_default_title() {
        let instance = ChatInstance::new("u1");
        assert_eq!(instance.title, DEFAULT_TITLE);
        assert!(instance.has_generic_title());
    }
}
