//! Response shaping types: surface, complexity and the per-query plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target channel for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    Text,
    Voice,
    Streaming,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Text => "text",
            Surface::Voice => "voice",
            Surface::Streaming => "streaming",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }
}

/// Outline and size estimate for one answer. Recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub outline: Vec<String>,
    pub estimated_tokens: u32,
    pub complexity: Complexity,
    pub should_split: bool,
}

impl ResponsePlan {
    /// Plan used whenever outlining fails.
    pub fn fallback() -> Self {
        Self {
            outline: vec![
                "Key points and information".to_string(),
                "Recommendations and next steps".to_string(),
            ],
            estimated_tokens: 200,
            complexity: Complexity::Moderate,
            should_split: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_is_safe() {
        let plan = ResponsePlan::fallback();
        assert_eq!(plan.outline.len(), 2);
        assert_eq!(plan.complexity, Complexity::Moderate);
        assert!(!plan.should_split);
    }

    #[test]
    fn test_surface_parses_lowercase() {
        let surface: Surface = serde_json::from_str("\"voice\"").unwrap();
        assert_eq!(surface, Surface::Voice);
    }
}
