//! HTTP Embeddings
//!
//! OpenAI-compatible `/embeddings` client. Used when the corpus was embedded
//! with a hosted model; the hash embedder covers offline setups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use advisor_config::EmbeddingSettings;
use advisor_core::{Embedder, Result};

use crate::RagError;

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_dim: usize,
    pub timeout: Duration,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: advisor_config::constants::endpoints::OPENAI_DEFAULT.to_string(),
            api_key: None,
            model: advisor_config::constants::models::EMBEDDING.to_string(),
            embedding_dim: advisor_config::constants::rag::EMBEDDING_DIM,
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&EmbeddingSettings> for HttpEmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            model: settings.model.clone(),
            embedding_dim: settings.dimension,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbeddingConfig) -> std::result::Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'))
    }

    async fn embed_raw(&self, text: &str) -> std::result::Result<Vec<f32>, RagError> {
        let mut request = self.client.post(self.embeddings_url()).json(&EmbedRequest {
            model: &self.config.model,
            input: text,
        });
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Embedding failed: {} - {}",
                status, text
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))?;

        if embedding.len() != self.config.embedding_dim {
            return Err(RagError::Embedding(format!(
                "Dimension mismatch: expected {}, got {}",
                self.config.embedding_dim,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_raw(text).await?)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = EmbeddingSettings {
            kind: "http".into(),
            endpoint: "https://example.test/v1/".into(),
            api_key: Some("key".into()),
            model: "text-embedding-3-small".into(),
            dimension: 1536,
        };
        let config = HttpEmbeddingConfig::from(&settings);
        assert_eq!(config.embedding_dim, 1536);

        let embedder = HttpEmbedder::new(config).unwrap();
        assert_eq!(embedder.embeddings_url(), "https://example.test/v1/embeddings");
        assert_eq!(embedder.dimension(), 1536);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2]}],"model":"m"}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_retrieval_error() {
        let embedder = HttpEmbedder::new(HttpEmbeddingConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert_eq!(err.kind(), "retrieval");
    }
}
