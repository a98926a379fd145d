//! Error handling for the RAG engine

use thiserror::Error;

/// Result type alias for the RAG engine
pub type Result<T> = std::result::Result<T, RagError>;

/// Main error type for the RAG engine
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors raised while parsing source documents
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error("Timeout: parsing took too long")]
    Timeout,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Parse failed: {0}")]
    Failed(String),
}

/// Errors related to external model services (embeddings, rerank, chat)
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Rerank failed: {0}")]
    RerankFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout: operation took too long")]
    Timeout,
}

/// Errors related to the vector and metadata stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector store error: {0}")]
    Vector(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),
}

/// Errors specific to the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No content to index")]
    NoContent,

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },
}

impl RagError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Llm(LlmError::Timeout)
                | RagError::Llm(LlmError::ConnectionFailed(_))
                | RagError::Http(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            RagError::Parse(_) => "parse",
            RagError::Llm(_) => "llm",
            RagError::Store(_) => "store",
            RagError::Ingest(_) => "ingest",
            RagError::Config(_) => "config",
            RagError::Io(_) => "io",
            RagError::Serialization(_) => "serialization",
            RagError::Http(_) => "http",
            RagError::Database(_) => "database",
            RagError::Generic(_) => "generic",
            RagError::NotFound(_) => "not_found",
        }
    }

    /// Short, user-safe message for untrusted boundaries.
    ///
    /// Internal paths, connection strings, and third-party error bodies are
    /// stripped; only the error kind and a short description survive.
    pub fn user_message(&self) -> String {
        match self {
            RagError::Parse(ParseError::UnsupportedType(ext)) => {
                format!("unsupported file type: {ext}")
            }
            RagError::Parse(ParseError::FileTooLarge { size, limit }) => {
                format!("file too large: {size} bytes (limit {limit})")
            }
            RagError::Parse(ParseError::NotAFile(_)) => "path is not a regular file".to_string(),
            RagError::Parse(ParseError::Timeout) => "document parsing timed out".to_string(),
            RagError::Parse(ParseError::InvalidJson(_)) => "invalid JSON document".to_string(),
            RagError::Parse(ParseError::Failed(_)) => "document parsing failed".to_string(),
            RagError::Llm(LlmError::InvalidResponse(_)) => {
                "language model returned an invalid response".to_string()
            }
            RagError::Llm(LlmError::Timeout) => "language model request timed out".to_string(),
            RagError::Llm(_) => "language model service unavailable".to_string(),
            RagError::Store(StoreError::Vector(_)) => "vector store operation failed".to_string(),
            RagError::Store(_) => "metadata store operation failed".to_string(),
            RagError::Ingest(e) => e.to_string(),
            RagError::Config(msg) => format!("configuration error: {msg}"),
            RagError::NotFound(what) => format!("not found: {what}"),
            _ => "internal error".to_string(),
        }
    }
}
