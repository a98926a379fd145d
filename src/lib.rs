//! Ragline: a retrieval-augmented generation engine
//!
//! Ingests heterogeneous documents, maintains a dual vector + metadata index
//! over their chunks, and answers search and ask queries by retrieving
//! semantically relevant chunks and optionally grounding an LLM answer in
//! them:
//! - deterministic, idempotent ingestion with content-addressed dedup
//! - a paragraph-preserving chunker with size and overlap budgets
//! - retrieval composing query transformation, vector search, and reranking
//! - grounded answering with bilingual empty-result handling
//!
//! # Example
//!
//! ```rust,no_run
//! use ragline::{AskRequest, Engine, RagConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(RagConfig::default()).await?;
//!     engine.initialize().await?;
//!
//!     let result = engine
//!         .index_text("Rust is a systems language.", "Notes", None)
//!         .await;
//!     println!("indexed {} chunks", result.chunk_count);
//!
//!     let response = engine.ask(AskRequest::new("What is Rust?")).await?;
//!     println!("{}", response.answer);
//!     Ok(())
//! }
//! ```

pub mod ask;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod metadata_store;
pub mod parser;
pub mod query;
pub mod reranker;
pub mod retrieval;
pub mod vector_store;

// Re-export main types
pub use ask::{AskEngine, AskRequest, AskResponse, AskSource};
pub use chunker::{estimate_tokens, TextChunk, TextChunker};
pub use config::{
    ChunkingConfig, EmbeddingConfig, LlmConfig, MetadataConfig, ParserConfig, QueryConfig,
    RagConfig, RerankerConfig, VectorConfig,
};
pub use document::{
    Chunk, Document, DocumentStatus, FileType, MetaMap, MetaValue, ParsedDocument, Section,
};
pub use embedding::{EmbeddingClient, HttpEmbeddingClient};
pub use engine::{Engine, EngineBuilder, EngineStats};
pub use error::{IngestError, LlmError, ParseError, RagError, Result, StoreError};
pub use ingest::{IndexOptions, IngestionPipeline, IngestionResult, IngestionStatus};
pub use llm::{ChatClient, GenerationOptions, GenerationResponse, Message, OpenAiChatClient, Role, TokenUsage};
pub use metadata_store::{DocumentPatch, IngestIntent, MetadataStore};
pub use parser::DocumentParser;
pub use query::QueryTransformer;
pub use reranker::{RerankEntry, RerankerClient, SENTINEL_SCORE};
pub use retrieval::{
    DocumentRef, RetrievalEngine, SearchMetadata, SearchOptions, SearchResult,
};
pub use vector_store::{
    CollectionInfo, InMemoryVectorStore, QdrantStore, ScoredPoint, SearchFilter, VectorPayload,
    VectorPoint, VectorStore,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
