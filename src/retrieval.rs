//! Retrieval pipeline: query transform, vector search, rerank, score reconciliation

use crate::document::FileType;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::metadata_store::MetadataStore;
use crate::query::QueryTransformer;
use crate::reranker::RerankerClient;
use crate::vector_store::{ScoredPoint, SearchFilter, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-request search options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    /// Ask for cross-encoder reranking (honored only when the reranker is enabled)
    pub rerank: bool,
    /// Ask for LLM query expansion
    pub expand: bool,
    /// Ask for hypothetical-document retrieval; wins over expansion
    pub hyde: bool,
    pub filter: Option<SearchFilter>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.0,
            rerank: false,
            expand: false,
            hyde: false,
            filter: None,
        }
    }
}

/// Document summary attached to each search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: Uuid,
    pub filename: String,
    pub filepath: String,
    pub file_type: FileType,
}

/// One retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
    pub document: DocumentRef,
}

/// What actually happened to the query during retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub original_query: String,
    pub query_expanded: bool,
    pub hyde_used: bool,
    pub rerank_used: bool,
}

/// Coordinates query transformation, vector search, and reranking
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<MetadataStore>,
    reranker: Arc<RerankerClient>,
    transformer: Arc<QueryTransformer>,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        reranker: Arc<RerankerClient>,
        transformer: Arc<QueryTransformer>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            metadata,
            reranker,
            transformer,
        }
    }

    /// Search and report what transformations took effect
    pub async fn search_with_metadata(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<(Vec<SearchResult>, SearchMetadata)> {
        let mut meta = SearchMetadata {
            original_query: query.to_string(),
            ..Default::default()
        };

        if query.trim().is_empty() {
            return Ok((Vec::new(), meta));
        }

        // HyDE wins when both transforms are requested
        let effective = if options.hyde
            && self.transformer.hyde_enabled()
            && self.transformer.should_use_hyde(query)
        {
            let document = self.transformer.hyde(query).await;
            meta.hyde_used = document != query;
            document
        } else if options.expand && self.transformer.expansion_enabled() {
            let expanded = self.transformer.expand(query).await;
            meta.query_expanded = expanded != query;
            expanded
        } else {
            query.to_string()
        };

        let rerank_requested = options.rerank && self.reranker.is_enabled();
        let k_fetch = if rerank_requested {
            options.limit * self.reranker.candidate_multiplier()
        } else {
            options.limit
        };

        let query_vector = self.embedder.embed_single(&effective).await?;
        let candidates = self
            .vectors
            .search(
                &query_vector,
                k_fetch,
                options.threshold,
                options.filter.as_ref(),
            )
            .await?;
        debug!(
            candidates = candidates.len(),
            k_fetch, "Vector search complete"
        );

        let mut results = self.shape_results(candidates).await?;

        if rerank_requested && results.len() > options.limit {
            let documents: Vec<String> = results.iter().map(|r| r.content.clone()).collect();
            let entries = self
                .reranker
                .rerank(query, &documents, options.limit)
                .await;

            // Sentinel scores keep the vector score; real scores replace it
            let mut reranked = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(candidate) = results.get(entry.index) else {
                    continue;
                };
                let mut hit = candidate.clone();
                if entry.score >= 0.0 {
                    hit.score = entry.score;
                }
                reranked.push(hit);
            }
            results = reranked;
            meta.rerank_used = true;
        }

        results.truncate(options.limit);
        Ok((results, meta))
    }

    /// Convenience search that drops the transformation metadata
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let (results, _) = self.search_with_metadata(query, options).await?;
        Ok(results)
    }

    /// Turn scored points into results, backfilling content from the
    /// metadata store for payloads that do not carry it
    async fn shape_results(&self, candidates: Vec<ScoredPoint>) -> Result<Vec<SearchResult>> {
        let missing: Vec<Uuid> = candidates
            .iter()
            .filter(|point| point.payload.content.is_none())
            .map(|point| point.chunk_id)
            .collect();

        let mut backfill: HashMap<Uuid, String> = HashMap::new();
        if !missing.is_empty() {
            debug!(count = missing.len(), "Backfilling chunk content");
            for chunk in self.metadata.get_chunks_by_ids(&missing).await? {
                backfill.insert(chunk.id, chunk.content);
            }
        }

        let mut results = Vec::with_capacity(candidates.len());
        for point in candidates {
            let content = match point.payload.content.clone() {
                Some(content) => content,
                None => match backfill.get(&point.chunk_id) {
                    Some(content) => content.clone(),
                    None => {
                        warn!(chunk_id = %point.chunk_id, "Vector hit without chunk content");
                        continue;
                    }
                },
            };

            results.push(SearchResult {
                chunk_id: point.chunk_id,
                document_id: point.payload.document_id,
                content,
                score: point.score,
                document: DocumentRef {
                    id: point.payload.document_id,
                    filename: point.payload.filename,
                    filepath: point.payload.filepath,
                    file_type: point.payload.file_type,
                },
            });
        }
        Ok(results)
    }
}
