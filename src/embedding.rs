//! Embedding service client

use crate::config::EmbeddingConfig;
use crate::error::{LlmError, Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Trait for mapping texts to fixed-dimension vectors
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    ///
    /// The returned vector count equals the input count; callers treat any
    /// mismatch as a fatal pipeline error.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed embedding dimension D
    fn dimension(&self) -> usize;
}

/// HTTP embedding client (OpenAI-compatible `/embeddings` endpoint)
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Embed one batch, which must fit the provider's input limits
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let url = self.api_url();
        debug!("Embedding {} texts via {}", texts.len(), url);

        let response = timeout(
            Duration::from_secs(self.config.timeout),
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Embedding API error: {}", error_text);
            return Err(LlmError::EmbeddingFailed(error_text).into());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        for vector in &vectors {
            if vector.len() != self.config.dimension {
                return Err(StoreError::InvalidDimension {
                    expected: self.config.dimension,
                    actual: vector.len(),
                }
                .into());
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Sequential batching keeps the output aligned with the input order
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }

        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("no embedding returned".to_string()).into())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
