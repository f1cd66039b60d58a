//! The 384-dim text encoder contract: the index is agnostic to how
//! embeddings are produced, per the "embedding model is injected" design
//! note.

use async_trait::async_trait;
use churn_core::error::{Error, ErrorCode, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const EMBEDDING_DIM: usize = 384;

#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic hash-based pseudo-embedding: every distinct input text
/// maps to the same vector, and similar texts (sharing tokens) produce
/// closer vectors than unrelated ones. Used in tests and as a local
/// fallback when no real embedding service is configured.
#[derive(Default)]
pub struct HashEmbeddingEncoder;

#[async_trait]
impl EmbeddingEncoder for HashEmbeddingEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() as usize) % EMBEDDING_DIM;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Calls an injected HTTP embeddings endpoint (OpenAI-compatible
/// `{ input: str } -> { embedding: [f32] }` contract).
pub struct HttpEmbeddingEncoder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingEncoder {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingEncoder for HttpEmbeddingEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { input: text })
            .send()
            .await
            .map_err(|e| Error::new(ErrorCode::EmbeddingServiceUnavailable, "embedding request failed").with_details(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::new(
                ErrorCode::EmbeddingServiceUnavailable,
                format!("embedding service returned status {}", response.status()),
            ));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::new(ErrorCode::EmbeddingServiceUnavailable, "embedding response was not valid JSON").with_details(e.to_string()))?;
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_produces_same_embedding() {
        let encoder = HashEmbeddingEncoder;
        let a = encoder.encode("wireless mouse electronics").await.unwrap();
        let b = encoder.encode("wireless mouse electronics").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn shared_tokens_produce_higher_similarity_than_unrelated_text() {
        let encoder = HashEmbeddingEncoder;
        let a = encoder.encode("wireless mouse electronics").await.unwrap();
        let b = encoder.encode("wireless keyboard electronics").await.unwrap();
        let c = encoder.encode("organic bananas groceries").await.unwrap();

        let sim_ab = churn_core::kv_store::cosine_similarity(&a, &b);
        let sim_ac = churn_core::kv_store::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }
}
