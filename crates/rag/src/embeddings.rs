//! Text Embeddings
//!
//! Deterministic feature-hashing embedder plus the similarity function shared
//! by the in-memory store.

use async_trait::async_trait;

use advisor_core::{Embedder, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub embedding_dim: usize,
    /// Scale every vector to unit length
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: advisor_config::constants::rag::EMBEDDING_DIM,
            normalize: true,
        }
    }
}

/// Weight of a whole word relative to one of its trigrams
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder (no model required)
///
/// Words and their character trigrams are hashed into buckets, so texts that
/// share vocabulary or word stems score close. Good enough for development
/// and tests; use the HTTP embedder for real semantic search.
pub struct SimpleEmbedder {
    config: EmbeddingConfig,
}

impl SimpleEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config: EmbeddingConfig {
                embedding_dim: config.embedding_dim.max(1),
                ..config
            },
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let dim = self.config.embedding_dim;
        let mut embedding = vec![0.0f32; dim];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            embedding[bucket(word.as_bytes(), dim)] += WORD_WEIGHT;

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                embedding[bucket(gram.as_bytes(), dim)] += TRIGRAM_WEIGHT;
            }
        }

        if self.config.normalize {
            normalize(&mut embedding);
        }

        embedding
    }
}

/// FNV-1a, stable across platforms and runs
fn bucket(bytes: &[u8], dim: usize) -> usize {
    let hash = bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    });
    (hash % dim as u64) as usize
}

impl Default for SimpleEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

#[async_trait]
impl Embedder for SimpleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
