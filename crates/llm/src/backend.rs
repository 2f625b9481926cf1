//! OpenAI-compatible chat completions backend
//!
//! Groq, OpenAI and Ollama (`/v1`) all accept the same request shape, so a
//! single backend covers the fast and quality providers. The only thing that
//! varies per provider is the endpoint and whether a key is required.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use advisor_core::{GenerationConfig, LanguageModel, Message, Result};

use crate::LlmError;

/// Configuration for an OpenAI-compatible backend
#[derive(Debug, Clone)]
pub struct ChatBackendConfig {
    /// Provider label used in logs, metrics and errors
    pub provider: String,
    /// Base URL, e.g. `https://api.groq.com/openai/v1`
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ChatBackendConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            endpoint: advisor_config::constants::endpoints::GROQ_DEFAULT.to_string(),
            api_key: None,
            model: advisor_config::constants::models::FAST.to_string(),
            timeout: Duration::from_millis(advisor_config::constants::timeouts::LLM_REQUEST_MS),
        }
    }
}

impl ChatBackendConfig {
    pub fn new(provider: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_local(&self) -> bool {
        self.endpoint.starts_with("http://localhost") || self.endpoint.starts_with("http://127.0.0.1")
    }
}

/// Chat completions backend
pub struct ChatCompletionsBackend {
    config: ChatBackendConfig,
    client: Client,
}

impl ChatCompletionsBackend {
    pub fn new(config: ChatBackendConfig) -> std::result::Result<Self, LlmError> {
        let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_key && !config.is_local() {
            return Err(LlmError::Configuration(format!(
                "API key required for remote provider {}",
                config.provider
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref key) = self.config.api_key {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    async fn execute(&self, request: &ChatRequest<'_>) -> std::result::Result<String, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse("Empty completion".to_string()));
        }

        if let Some(usage) = response.usage {
            tracing::debug!(
                provider = %self.config.provider,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        Ok(text)
    }
}

/// Map an HTTP failure onto the error classes the retry layer understands
fn classify_status(status: u16, body: &str) -> LlmError {
    let lower = body.to_lowercase();
    if status == 429 || lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited(format!("HTTP {}: {}", status, body))
    } else if status >= 500 {
        LlmError::Network(format!("Server error {}: {}", status, body))
    } else {
        LlmError::Api(format!("HTTP {}: {}", status, body))
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsBackend {
    async fn generate(&self, messages: &[Message], config: &GenerationConfig) -> Result<String> {
        let start = Instant::now();

        let request = ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stream: false,
        };

        let result = self.execute(&request).await;

        match &result {
            Ok(text) => tracing::debug!(
                provider = %self.config.provider,
                model = %self.config.model,
                chars = text.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Completion received"
            ),
            Err(e) => tracing::warn!(
                provider = %self.config.provider,
                model = %self.config.model,
                error = %e,
                "Completion failed"
            ),
        }

        result.map_err(|e| e.into_core(&self.config.provider))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        &self.config.provider
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.endpoint.trim_end_matches('/'));
        self.client
            .get(&url)
            .headers(self.build_headers())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_requires_key() {
        let config = ChatBackendConfig::default();
        assert!(matches!(
            ChatCompletionsBackend::new(config),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_local_endpoint_without_key() {
        let config = ChatBackendConfig::new("ollama", "http://localhost:11434/v1", "qwen2.5:7b");
        let backend = ChatCompletionsBackend::new(config).unwrap();
        assert_eq!(backend.chat_url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(backend.provider_name(), "ollama");
    }

    #[test]
    fn test_chat_url_trims_slash() {
        let config = ChatBackendConfig::new("openai", "https://api.openai.com/v1/", "gpt-4o-mini")
            .with_api_key("sk-test");
        let backend = ChatCompletionsBackend::new(config).unwrap();
        assert_eq!(backend.chat_url(), "https://api.openai.com/v1/chat/completions");
        assert!(backend
            .build_headers()
            .get(reqwest::header::AUTHORIZATION)
            .is_some());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, ""), LlmError::RateLimited(_)));
        assert!(matches!(
            classify_status(400, "Rate limit reached for model"),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(classify_status(503, "overloaded"), LlmError::Network(_)));
        assert!(matches!(classify_status(401, "bad key"), LlmError::Api(_)));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "llama-3.1-8b-instant",
            messages: vec![ChatMessage {
                role: "user",
                content: "Hello",
            }],
            max_tokens: 100,
            temperature: 0.3,
            top_p: 0.8,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hi"}}],"usage":{"prompt_tokens":5,"completion_tokens":1,"total_tokens":6}}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, 1);
    }
}
