//! External gateway contracts
//!
//! This module provides the abstractions over the two network-bound
//! capabilities the engine orchestrates:
//! - An embedding gateway (text -> fixed-length vector)
//! - A text-generation gateway (prompt -> text)
//!
//! Both are blocking network calls from the workflow's perspective; retry
//! against transient transport errors lives inside the HTTP clients, while
//! the workflow treats any surfaced error as the gateway being unavailable.

mod embedding;
mod generation;

pub use embedding::*;
pub use generation::*;

use crate::config::{EmbeddingConfig, GenerationConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Decoding constraints passed with every generation request
#[derive(Debug, Clone)]
pub struct GenerationConstraints {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&GenerationConfig> for GenerationConstraints {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Trait for text-generation providers
#[async_trait]
pub trait TextGenerationGateway: Send + Sync {
    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str, constraints: &GenerationConstraints) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedding gateway based on configuration
pub fn create_embedding_gateway(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGateway>> {
    Ok(Arc::new(HttpEmbeddingGateway::new(config)?))
}

/// Create a text-generation gateway based on configuration
pub fn create_generation_gateway(
    config: &GenerationConfig,
) -> Result<Arc<dyn TextGenerationGateway>> {
    Ok(Arc::new(HttpGenerationGateway::new(config)?))
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    gateway: &dyn EmbeddingGateway,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch: Vec<String> = chunk.to_vec();
        let embeddings = gateway.embed(batch).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticEmbedder;

    #[tokio::test]
    async fn test_embed_in_batches_preserves_order() {
        let gateway = StaticEmbedder::by_length(4);
        let texts: Vec<String> = (0..10).map(|i| "x".repeat(i + 1)).collect();

        let embeddings = embed_in_batches(&gateway, texts.clone(), 3).await.unwrap();

        assert_eq!(embeddings.len(), 10);
        for (text, vector) in texts.iter().zip(&embeddings) {
            assert_eq!(vector[0], text.len() as f32);
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches_zero_batch_size() {
        let gateway = StaticEmbedder::by_length(4);
        let embeddings = embed_in_batches(&gateway, vec!["a".to_string()], 0)
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 1);
    }
}
