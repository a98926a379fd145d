//! Vector store interface and backends

use crate::config::VectorConfig;
use crate::document::FileType;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload stored alongside each chunk vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPayload {
    pub document_id: Uuid,
    pub filename: String,
    pub filepath: String,
    pub file_type: FileType,
    pub chunk_index: i64,
    /// Chunk content carried in the payload so retrieval can skip a
    /// metadata-store roundtrip
    #[serde(default)]
    pub content: Option<String>,
}

/// A point to upsert: id, vector, payload
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A similarity hit, sorted by descending score
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub chunk_id: Uuid,
    pub score: f32,
    pub payload: VectorPayload,
}

/// Equality filter applied to payload fields during search
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub document_ids: Option<Vec<Uuid>>,
    pub file_type: Option<FileType>,
}

impl SearchFilter {
    fn matches(&self, payload: &VectorPayload) -> bool {
        if let Some(ids) = &self.document_ids {
            if !ids.contains(&payload.document_id) {
                return false;
            }
        }
        if let Some(file_type) = self.file_type {
            if payload.file_type != file_type {
                return false;
            }
        }
        true
    }
}

/// Collection health snapshot
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub vector_count: u64,
    pub status: String,
}

/// Abstract vector store the core requires
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing; idempotent
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Insert or fully replace points by id
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Similarity search sorted by descending score
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Remove every point whose payload references the document
    async fn delete_by_document(&self, document_id: Uuid) -> Result<()>;

    /// Collection statistics
    async fn collection_info(&self) -> Result<CollectionInfo>;
}

/// Qdrant-backed vector store over its HTTP API
pub struct QdrantStore {
    client: reqwest::Client,
    config: VectorConfig,
}

impl QdrantStore {
    pub fn new(config: VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| StoreError::Vector(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.collection,
            suffix
        )
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Vector(format!("{context}: {status}: {body}")).into())
        }
    }

    fn qdrant_filter(filter: Option<&SearchFilter>) -> Option<serde_json::Value> {
        let filter = filter?;
        let mut must = Vec::new();
        if let Some(ids) = &filter.document_ids {
            must.push(json!({
                "key": "document_id",
                "match": {"any": ids.iter().map(Uuid::to_string).collect::<Vec<_>>()}
            }));
        }
        if let Some(file_type) = filter.file_type {
            must.push(json!({
                "key": "file_type",
                "match": {"value": file_type.as_str()}
            }));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let probe = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        if probe.status().is_success() {
            debug!(collection = %self.config.collection, "Collection already exists");
            return Ok(());
        }

        let body = json!({
            "vectors": {"size": dimension, "distance": "Cosine"}
        });
        let response = self
            .client
            .put(self.collection_url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Self::check(response, "create collection").await?;

        info!(
            collection = %self.config.collection,
            dimension, "Created vector collection"
        );
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let body = json!({
            "points": points
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id.to_string(),
                        "vector": p.vector,
                        "payload": p.payload,
                    })
                })
                .collect::<Vec<_>>()
        });

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Self::check(response, "upsert points").await?;

        debug!("Upserted {} points", points.len());
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": query,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        if let Some(qf) = Self::qdrant_filter(filter) {
            body["filter"] = qf;
        }

        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        let response = Self::check(response, "search points").await?;

        #[derive(Deserialize)]
        struct SearchBody {
            result: Vec<SearchHit>,
        }
        #[derive(Deserialize)]
        struct SearchHit {
            id: String,
            score: f32,
            payload: VectorPayload,
        }

        let parsed: SearchBody = response
            .json()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;

        let mut points = Vec::with_capacity(parsed.result.len());
        for hit in parsed.result {
            let chunk_id = Uuid::parse_str(&hit.id)
                .map_err(|e| StoreError::Vector(format!("bad point id {}: {e}", hit.id)))?;
            points.push(ScoredPoint {
                chunk_id,
                score: hit.score,
                payload: hit.payload,
            });
        }
        Ok(points)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        let body = json!({
            "filter": {
                "must": [{"key": "document_id", "match": {"value": document_id.to_string()}}]
            }
        });

        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        Self::check(response, "delete points").await?;

        debug!(document_id = %document_id, "Deleted document vectors");
        Ok(())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let response = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;
        let response = Self::check(response, "collection info").await?;

        #[derive(Deserialize)]
        struct InfoBody {
            result: InfoResult,
        }
        #[derive(Deserialize)]
        struct InfoResult {
            #[serde(default)]
            points_count: u64,
            #[serde(default)]
            status: String,
        }

        let parsed: InfoBody = response
            .json()
            .await
            .map_err(|e| StoreError::Vector(e.to_string()))?;

        Ok(CollectionInfo {
            vector_count: parsed.result.points_count,
            status: parsed.result.status,
        })
    }
}

/// Brute-force cosine store used for tests and small deployments
#[derive(Default)]
pub struct InMemoryVectorStore {
    points: RwLock<HashMap<Uuid, (Vec<f32>, VectorPayload)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate cosine similarity between two vectors
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, _dimension: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let mut store = self.points.write().await;
        for point in points {
            store.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let store = self.points.read().await;

        let mut results: Vec<ScoredPoint> = store
            .iter()
            .filter(|(_, (_, payload))| filter.map_or(true, |f| f.matches(payload)))
            .map(|(id, (vector, payload))| ScoredPoint {
                chunk_id: *id,
                score: Self::cosine_similarity(query, vector),
                payload: payload.clone(),
            })
            .filter(|point| point.score >= score_threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        let mut store = self.points.write().await;
        store.retain(|_, (_, payload)| payload.document_id != document_id);
        Ok(())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let store = self.points.read().await;
        Ok(CollectionInfo {
            vector_count: store.len() as u64,
            status: "green".to_string(),
        })
    }
}
