//! Configuration management for the RAG engine

use serde::{Deserialize, Serialize};

/// Main configuration for the RAG engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// Chat LLM configuration
    pub llm: LlmConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,

    /// Query transformation (expansion / HyDE) configuration
    pub query: QueryConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Vector store configuration
    pub vector: VectorConfig,

    /// Metadata store configuration
    pub metadata: MetadataConfig,

    /// Parser configuration
    #[serde(default)]
    pub parser: ParserConfig,
}

/// Chat LLM configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat completion service
    pub base_url: String,

    /// Default model for answer generation
    pub model: String,

    /// Temperature for grounded answering
    pub temperature: f32,

    /// Upper bound on completion tokens
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout: 60,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service
    pub base_url: String,

    /// Embedding model name
    pub model: String,

    /// Fixed embedding dimension D
    pub dimension: usize,

    /// Maximum texts per request
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,

    /// Request timeout in seconds
    pub timeout: u64,
}

fn default_embed_batch() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001/v1".to_string(),
            model: "bge-m3".to_string(),
            dimension: 1024,
            batch_size: default_embed_batch(),
            timeout: 30,
        }
    }
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Whether reranking is available at all
    pub enabled: bool,

    /// Base URL of the rerank service
    pub base_url: String,

    /// Reranker model name
    pub model: String,

    /// Over-fetch factor applied before reranking
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Request timeout in seconds
    pub timeout: u64,
}

fn default_candidate_multiplier() -> usize {
    3
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8002/v1".to_string(),
            model: "bge-reranker-v2-m3".to_string(),
            candidate_multiplier: default_candidate_multiplier(),
            timeout: 30,
        }
    }
}

/// Query transformation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Allow LLM query expansion when a request asks for it
    pub enable_expansion: bool,

    /// Allow hypothetical-document retrieval when a request asks for it
    pub enable_hyde: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enable_expansion: true,
            enable_hyde: true,
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in estimated tokens
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in estimated tokens
    pub chunk_overlap: usize,

    /// Minimum chunk size in estimated tokens
    pub min_chunk_size: usize,

    /// Split on paragraph boundaries where possible
    pub preserve_paragraphs: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            min_chunk_size: 50,
            preserve_paragraphs: true,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Base URL of the vector store HTTP API
    pub base_url: String,

    /// Collection name holding chunk vectors
    pub collection: String,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            collection: "ragline".to_string(),
            timeout: 30,
        }
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database URL
    pub database_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ragline.db".to_string(),
        }
    }
}

/// Parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Maximum file size in bytes
    pub max_file_size: u64,

    /// Per-document parse timeout in seconds
    pub timeout: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            timeout: 60,
        }
    }
}

impl RagConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("llm.base_url", &self.llm.base_url),
            ("embedding.base_url", &self.embedding.base_url),
            ("vector.base_url", &self.vector.base_url),
        ] {
            if !url.starts_with("http") {
                return Err(anyhow::anyhow!("Invalid URL for {}: {}", name, url));
            }
        }

        if self.reranker.enabled && !self.reranker.base_url.starts_with("http") {
            return Err(anyhow::anyhow!(
                "Invalid URL for reranker.base_url: {}",
                self.reranker.base_url
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(anyhow::anyhow!(
                "Embedding dimension must be greater than 0"
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(anyhow::anyhow!("Embedding batch size must be greater than 0"));
        }

        if self.llm.model.is_empty() || self.embedding.model.is_empty() {
            return Err(anyhow::anyhow!("Model names cannot be empty"));
        }

        if self.chunking.chunk_size == 0 {
            return Err(anyhow::anyhow!("Chunk size must be greater than 0"));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(anyhow::anyhow!(
                "Chunk overlap must be smaller than chunk size"
            ));
        }

        if self.reranker.candidate_multiplier == 0 {
            return Err(anyhow::anyhow!(
                "Reranker candidate multiplier must be greater than 0"
            ));
        }

        if self.vector.collection.is_empty() {
            return Err(anyhow::anyhow!("Vector collection name cannot be empty"));
        }

        Ok(())
    }
}
