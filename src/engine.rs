//! Engine facade: wires clients, stores, and coordinators

use crate::ask::{AskEngine, AskRequest, AskResponse};
use crate::config::RagConfig;
use crate::document::{Document, MetaMap};
use crate::embedding::{EmbeddingClient, HttpEmbeddingClient};
use crate::error::{RagError, Result};
use crate::ingest::{IndexOptions, IngestionPipeline, IngestionResult};
use crate::llm::{ChatClient, OpenAiChatClient};
use crate::metadata_store::MetadataStore;
use crate::parser::DocumentParser;
use crate::query::QueryTransformer;
use crate::reranker::RerankerClient;
use crate::retrieval::{RetrievalEngine, SearchMetadata, SearchOptions, SearchResult};
use crate::vector_store::{QdrantStore, VectorStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Aggregate store statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub documents: i64,
    pub chunks: i64,
    pub vectors: u64,
    pub collection_status: String,
}

/// The assembled RAG engine.
///
/// Every external collaborator is an explicit handle created on construction
/// and destroyed on shutdown; nothing is process-global.
pub struct Engine {
    metadata: Arc<MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    ingestion: Arc<IngestionPipeline>,
    retrieval: Arc<RetrievalEngine>,
    ask_engine: AskEngine,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Assemble an engine from configuration with default HTTP-backed handles
    pub async fn new(config: RagConfig) -> Result<Self> {
        EngineBuilder::new(config).build().await
    }

    /// Start building an engine, substituting handles as needed
    pub fn builder(config: RagConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Prepare both stores; idempotent and safe to call on every startup
    pub async fn initialize(&self) -> Result<()> {
        self.ingestion.initialize().await
    }

    /// Release held resources
    pub async fn shutdown(&self) {
        self.metadata.close().await;
        info!("Engine shut down");
    }

    /// Ingest a file from disk
    pub async fn index_document(&self, path: &Path, options: IndexOptions) -> IngestionResult {
        self.ingestion.index_document(path, options).await
    }

    /// Ingest raw text as a virtual document
    pub async fn index_text(
        &self,
        content: &str,
        title: &str,
        metadata: Option<MetaMap>,
    ) -> IngestionResult {
        self.ingestion.index_text(content, title, metadata).await
    }

    /// Delete a document and its derived state
    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        self.ingestion.delete_document(id).await
    }

    /// Semantic search over indexed chunks
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.retrieval.search(query, options).await
    }

    /// Semantic search reporting the transformation metadata
    pub async fn search_with_metadata(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<(Vec<SearchResult>, SearchMetadata)> {
        self.retrieval.search_with_metadata(query, options).await
    }

    /// Answer a question grounded in retrieved context
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        self.ask_engine.ask(request).await
    }

    /// Fetch one document record
    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        self.metadata.get_document(id).await
    }

    /// List document records, newest first
    pub async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        self.metadata.list_documents(limit, offset).await
    }

    /// Aggregate counts from both stores
    pub async fn stats(&self) -> Result<EngineStats> {
        let collection = self.vectors.collection_info().await?;
        Ok(EngineStats {
            documents: self.metadata.count_documents().await?,
            chunks: self.metadata.count_all_chunks().await?,
            vectors: collection.vector_count,
            collection_status: collection.status,
        })
    }

    /// The ingestion coordinator
    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.ingestion
    }

    /// The retrieval coordinator
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }
}

/// Builds an [`Engine`], allowing any handle to be substituted (for tests
/// or alternative backends)
pub struct EngineBuilder {
    config: RagConfig,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    vectors: Option<Arc<dyn VectorStore>>,
    chat: Option<Arc<dyn ChatClient>>,
    reranker: Option<Arc<RerankerClient>>,
    metadata: Option<Arc<MetadataStore>>,
}

impl EngineBuilder {
    pub fn new(config: RagConfig) -> Self {
        Self {
            config,
            embedder: None,
            vectors: None,
            chat: None,
            reranker: None,
            metadata: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingClient>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_vector_store(mut self, vectors: Arc<dyn VectorStore>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn with_chat_client(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<RerankerClient>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_metadata_store(mut self, metadata: Arc<MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validate the configuration and wire the engine
    pub async fn build(self) -> Result<Engine> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        info!("Initializing RAG engine");

        let embedder: Arc<dyn EmbeddingClient> = match self.embedder {
            Some(embedder) => embedder,
            None => Arc::new(HttpEmbeddingClient::new(config.embedding.clone())?),
        };
        let vectors: Arc<dyn VectorStore> = match self.vectors {
            Some(vectors) => vectors,
            None => Arc::new(QdrantStore::new(config.vector.clone())?),
        };
        let chat: Arc<dyn ChatClient> = match self.chat {
            Some(chat) => chat,
            None => Arc::new(OpenAiChatClient::new(config.llm.clone())?),
        };
        let reranker = match self.reranker {
            Some(reranker) => reranker,
            None => Arc::new(RerankerClient::new(config.reranker.clone())?),
        };
        let metadata = match self.metadata {
            Some(metadata) => metadata,
            None => Arc::new(MetadataStore::connect(&config.metadata.database_url).await?),
        };

        let parser = Arc::new(DocumentParser::new(config.parser.clone()));
        let transformer = Arc::new(QueryTransformer::new(chat.clone(), config.query.clone()));

        let ingestion = Arc::new(IngestionPipeline::new(
            parser,
            embedder.clone(),
            vectors.clone(),
            metadata.clone(),
            config.chunking.clone(),
        ));
        let retrieval = Arc::new(RetrievalEngine::new(
            embedder,
            vectors.clone(),
            metadata.clone(),
            reranker,
            transformer,
        ));
        let ask_engine = AskEngine::new(retrieval.clone(), chat, config.llm.model.clone());

        info!("RAG engine assembled");

        Ok(Engine {
            metadata,
            vectors,
            ingestion,
            retrieval,
            ask_engine,
        })
    }
}
