//! Cross-encoder reranker client with pass-through fallback

use crate::config::RerankerConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Score signalling "no reranker opinion"; callers keep the original score
pub const SENTINEL_SCORE: f32 = -1.0;

/// One reranked entry: the input index and its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct RerankEntry {
    pub index: usize,
    pub score: f32,
}

/// HTTP reranker client.
///
/// Never fails upward: transport and HTTP errors degrade to a pass-through
/// of the input order with sentinel scores.
pub struct RerankerClient {
    client: reqwest::Client,
    config: RerankerConfig,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl RerankerClient {
    /// Create a new reranker client
    pub fn new(config: RerankerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| crate::error::LlmError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Over-fetch factor the retrieval coordinator applies before reranking
    pub fn candidate_multiplier(&self) -> usize {
        self.config.candidate_multiplier
    }

    fn api_url(&self) -> String {
        format!("{}/rerank", self.config.base_url.trim_end_matches('/'))
    }

    /// Re-score documents against the query, returning at most `top_n`
    /// entries ordered by descending relevance.
    ///
    /// When the candidate set is no larger than `top_n` the call is skipped
    /// and every input index comes back in order with the sentinel score.
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Vec<RerankEntry> {
        if documents.is_empty() || top_n == 0 {
            return Vec::new();
        }

        if documents.len() <= top_n {
            debug!(
                "Skipping rerank: {} documents <= top_n {}",
                documents.len(),
                top_n
            );
            return passthrough(documents.len(), top_n);
        }

        match self.call_service(query, documents, top_n).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Rerank failed, falling back to input order: {}", e);
                passthrough(documents.len(), top_n)
            }
        }
    }

    async fn call_service(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankEntry>> {
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n,
        };

        let url = self.api_url();
        debug!("Reranking {} documents via {}", documents.len(), url);

        let response = timeout(
            Duration::from_secs(self.config.timeout),
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| crate::error::LlmError::Timeout)?
        .map_err(|e| crate::error::LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(crate::error::LlmError::RerankFailed(error_text).into());
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| crate::error::LlmError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .take(top_n)
            .filter(|r| r.index < documents.len())
            .map(|r| RerankEntry {
                index: r.index,
                score: r.relevance_score,
            })
            .collect())
    }
}

/// First `top_n` input indices, in order, carrying the sentinel score
fn passthrough(count: usize, top_n: usize) -> Vec<RerankEntry> {
    (0..count.min(top_n))
        .map(|index| RerankEntry {
            index,
            score: SENTINEL_SCORE,
        })
        .collect()
}
