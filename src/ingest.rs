//! Ingestion pipeline: parse, chunk, embed, persist

use crate::chunker::TextChunker;
use crate::config::ChunkingConfig;
use crate::document::{
    Chunk, Document, DocumentStatus, FileType, MetaMap, MetaValue, ParsedDocument,
};
use crate::embedding::EmbeddingClient;
use crate::error::{IngestError, RagError, Result};
use crate::metadata_store::{DocumentPatch, IngestIntent, MetadataStore};
use crate::parser::DocumentParser;
use crate::vector_store::{VectorPayload, VectorPoint, VectorStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-request ingestion options
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub force_reindex: bool,
}

/// Terminal status of one ingestion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failed,
}

/// Outcome of `index_document` / `index_text`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub document_id: Uuid,
    pub chunk_count: i64,
    pub status: IngestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionResult {
    fn success(document_id: Uuid, chunk_count: i64) -> Self {
        Self {
            document_id,
            chunk_count,
            status: IngestionStatus::Success,
            error: None,
        }
    }

    fn failed(document_id: Uuid, error: &RagError) -> Self {
        Self {
            document_id,
            chunk_count: 0,
            status: IngestionStatus::Failed,
            error: Some(error.user_message()),
        }
    }
}

/// Coordinates end-to-end document ingestion.
///
/// Writes are ordered so any state visible to queries is consistent: chunk
/// rows commit before their vectors, and the document status flips to
/// `indexed` only after both. Failures roll forward to a clean
/// "failed, no vectors" state.
#[derive(Clone)]
pub struct IngestionPipeline {
    parser: Arc<DocumentParser>,
    embedder: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<MetadataStore>,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(
        parser: Arc<DocumentParser>,
        embedder: Arc<dyn EmbeddingClient>,
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            parser,
            embedder,
            vectors,
            metadata,
            chunking,
        }
    }

    /// Prepare stores for use; idempotent
    pub async fn initialize(&self) -> Result<()> {
        self.metadata.initialize().await?;
        self.vectors
            .ensure_collection(self.embedder.dimension())
            .await?;
        Ok(())
    }

    /// Ingest a file from disk.
    ///
    /// Never returns an error: every failure is captured in the result, and
    /// when a document row exists it ends in status `failed` with the error
    /// recorded in its metadata.
    pub async fn index_document(&self, path: &Path, options: IndexOptions) -> IngestionResult {
        let (template, checksum) = match self.prepare_file(path).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rejected before ingestion");
                return IngestionResult::failed(Uuid::nil(), &e);
            }
        };

        // A reindex deletes the old document and retries with a fresh id; the
        // bound covers pathological races on the same path.
        let mut template = template;
        for _ in 0..3 {
            let intent = match self
                .metadata
                .resolve_ingest_intent(&template, &checksum, options.force_reindex)
                .await
            {
                Ok(intent) => intent,
                Err(e) => return IngestionResult::failed(Uuid::nil(), &e),
            };

            match intent {
                IngestIntent::Existing { id, chunk_count } => {
                    debug!(document_id = %id, "Unchanged document, skipping ingestion");
                    return IngestionResult::success(id, chunk_count);
                }
                IngestIntent::Reindex { old_id } => {
                    info!(document_id = %old_id, path = %path.display(), "Reindexing document");
                    if let Err(e) = self.remove_document_state(old_id).await {
                        return IngestionResult::failed(old_id, &e);
                    }
                    template = Document {
                        id: Uuid::new_v4(),
                        ..template
                    };
                }
                IngestIntent::New { id } => {
                    return self.run_pipeline(id, Some(path), None, &options).await;
                }
            }
        }

        let error = RagError::Config("ingestion intent did not settle".to_string());
        IngestionResult::failed(Uuid::nil(), &error)
    }

    /// Ingest raw text under a virtual `memory://` path.
    ///
    /// Each call creates a fresh document; there is no checksum dedup.
    pub async fn index_text(
        &self,
        content: &str,
        title: &str,
        metadata: Option<MetaMap>,
    ) -> IngestionResult {
        if content.trim().is_empty() {
            return IngestionResult::failed(Uuid::nil(), &IngestError::NoContent.into());
        }

        let id = Uuid::new_v4();
        let mut doc = Document::new(
            format!("memory://{id}"),
            title.to_string(),
            FileType::Txt,
            "text/plain".to_string(),
        );
        doc.id = id;
        doc.size_bytes = content.len() as i64;
        doc.checksum = Some(hex::encode(Sha256::digest(content.as_bytes())));

        if let Err(e) = self.metadata.insert_document(&doc).await {
            return IngestionResult::failed(id, &e);
        }

        let parsed = ParsedDocument {
            content: content.to_string(),
            metadata: metadata.unwrap_or_default(),
            sections: Vec::new(),
        };
        self.run_pipeline(id, None, Some(parsed), &IndexOptions::default())
            .await
    }

    /// Remove a document and all derived state; returns whether a row existed.
    ///
    /// Vectors are ripped before the row so a failure between the two leaves a
    /// zero-result ghost that a retry can finish, never a dangling vector.
    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        self.vectors.delete_by_document(id).await?;
        self.metadata.delete_chunks_by_document(id).await?;
        let removed = self.metadata.delete_document(id).await?;
        info!(document_id = %id, removed, "Deleted document");
        Ok(removed)
    }

    /// Stat, checksum, and classify a file before the intent decision
    async fn prepare_file(&self, path: &Path) -> Result<(Document, String)> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| crate::error::ParseError::NotAFile(path.display().to_string()))?;
        if !meta.is_file() {
            return Err(crate::error::ParseError::NotAFile(path.display().to_string()).into());
        }
        let size = meta.len();

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let file_type = FileType::from_extension(ext)
            .ok_or(crate::error::ParseError::UnsupportedType(ext.to_string()))?;

        let checksum = stream_checksum(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        let mut doc = Document::new(
            path.to_string_lossy().into_owned(),
            filename,
            file_type,
            mime_type,
        );
        doc.size_bytes = size as i64;
        doc.checksum = Some(checksum.clone());

        Ok((doc, checksum))
    }

    /// Delete old vectors then the old row (chunks cascade)
    async fn remove_document_state(&self, id: Uuid) -> Result<()> {
        self.vectors.delete_by_document(id).await?;
        self.metadata.delete_document(id).await?;
        Ok(())
    }

    /// Run parse, chunk, embed, and persist for a pending document row,
    /// capturing any failure into the row and the result.
    ///
    /// The body runs on a detached task so a caller cancelled mid-request
    /// cannot strand the document between `processing` and a terminal state:
    /// the task always reaches `indexed` or `failed` plus compensation.
    async fn run_pipeline(
        &self,
        id: Uuid,
        path: Option<&Path>,
        parsed: Option<ParsedDocument>,
        options: &IndexOptions,
    ) -> IngestionResult {
        let pipeline = self.clone();
        let path = path.map(Path::to_path_buf);
        let options = options.clone();

        let handle = tokio::spawn(async move {
            match pipeline.process(id, path.as_deref(), parsed, &options).await {
                Ok(chunk_count) => {
                    info!(document_id = %id, chunk_count, "Document indexed");
                    IngestionResult::success(id, chunk_count)
                }
                Err(e) => {
                    warn!(document_id = %id, error = %e, "Ingestion failed");
                    pipeline.compensate(id, &e).await;
                    IngestionResult::failed(id, &e)
                }
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let error = RagError::Generic(anyhow::anyhow!("ingestion task failed: {e}"));
                self.compensate(id, &error).await;
                IngestionResult::failed(id, &error)
            }
        }
    }

    async fn process(
        &self,
        id: Uuid,
        path: Option<&Path>,
        parsed: Option<ParsedDocument>,
        options: &IndexOptions,
    ) -> Result<i64> {
        self.metadata
            .update_document(
                id,
                DocumentPatch {
                    status: Some(DocumentStatus::Processing),
                    ..Default::default()
                },
            )
            .await?;

        let parsed = match parsed {
            Some(parsed) => parsed,
            None => {
                let path = path.expect("file ingestion carries a path");
                self.parser.parse(path).await?
            }
        };

        let chunker = TextChunker::new(ChunkingConfig {
            chunk_size: options.chunk_size.unwrap_or(self.chunking.chunk_size),
            chunk_overlap: options.chunk_overlap.unwrap_or(self.chunking.chunk_overlap),
            ..self.chunking.clone()
        });
        let text_chunks = chunker.chunk(&parsed.content);
        if text_chunks.is_empty() {
            return Err(IngestError::NoContent.into());
        }

        let contents: Vec<String> = text_chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&contents).await?;
        if vectors.len() != text_chunks.len() {
            return Err(IngestError::EmbeddingCountMismatch {
                expected: text_chunks.len(),
                actual: vectors.len(),
            }
            .into());
        }

        let doc = self
            .metadata
            .get_document(id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {id}")))?;

        let chunks: Vec<Chunk> = text_chunks
            .iter()
            .map(|c| Chunk {
                id: Uuid::new_v4(),
                document_id: id,
                content: c.content.clone(),
                chunk_index: c.index as i64,
                start_offset: c.start_offset as i64,
                end_offset: c.end_offset as i64,
                token_count: c.token_count as i64,
                metadata: MetaMap::new(),
            })
            .collect();

        // Chunk rows commit before their vectors; a chunk without a vector is
        // never queryable because retrieval gates on vector hits.
        self.metadata.insert_chunks(&chunks).await?;

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk.id,
                vector,
                payload: VectorPayload {
                    document_id: id,
                    filename: doc.filename.clone(),
                    filepath: doc.filepath.clone(),
                    file_type: doc.file_type,
                    chunk_index: chunk.chunk_index,
                    content: Some(chunk.content.clone()),
                },
            })
            .collect();
        self.vectors.upsert(points).await?;

        let chunk_count = chunks.len() as i64;
        self.metadata
            .update_document(id, self.indexed_patch(&doc, &parsed, chunk_count))
            .await?;

        Ok(chunk_count)
    }

    /// Build the final patch: indexed status plus parsed metadata enrichment
    fn indexed_patch(
        &self,
        doc: &Document,
        parsed: &ParsedDocument,
        chunk_count: i64,
    ) -> DocumentPatch {
        let mut metadata = doc.metadata.clone();
        for (key, value) in &parsed.metadata {
            metadata.insert(key.clone(), value.clone());
        }

        let tags = parsed.metadata.get("tags").map(|value| match value {
            MetaValue::Array(items) => items.iter().map(MetaValue::to_string_lossy).collect(),
            other => vec![other.to_string_lossy()],
        });

        let summary = parsed
            .metadata
            .get("description")
            .or_else(|| parsed.metadata.get("subject"))
            .map(|v| v.to_string_lossy());

        DocumentPatch {
            status: Some(DocumentStatus::Indexed),
            chunk_count: Some(chunk_count),
            metadata: Some(metadata),
            summary,
            tags,
            indexed_at: Some(chrono::Utc::now()),
            ..Default::default()
        }
    }

    /// Best-effort roll-forward to "failed, no vectors"
    async fn compensate(&self, id: Uuid, error: &RagError) {
        if let Err(e) = self.vectors.delete_by_document(id).await {
            warn!(document_id = %id, error = %e, "Compensating vector delete failed");
        }

        let mut metadata = match self.metadata.get_document(id).await {
            Ok(Some(doc)) => doc.metadata,
            _ => MetaMap::new(),
        };
        metadata.insert(
            "error".to_string(),
            MetaValue::String(error.to_string()),
        );

        if let Err(e) = self
            .metadata
            .update_document(
                id,
                DocumentPatch {
                    status: Some(DocumentStatus::Failed),
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(document_id = %id, error = %e, "Recording ingestion failure failed");
        }
    }
}

/// SHA-256 of the file contents, streamed in 64 KiB reads
async fn stream_checksum(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_checksum_matches_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content = b"checksum me please".repeat(10_000);
        std::fs::write(&path, &content).unwrap();

        let streamed = stream_checksum(&path).await.unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(&content)));
    }

    #[test]
    fn test_result_constructors() {
        let id = Uuid::new_v4();
        let ok = IngestionResult::success(id, 4);
        assert_eq!(ok.status, IngestionStatus::Success);
        assert_eq!(ok.chunk_count, 4);
        assert!(ok.error.is_none());

        let err: RagError = IngestError::NoContent.into();
        let failed = IngestionResult::failed(id, &err);
        assert_eq!(failed.status, IngestionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("No content to index"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&IngestionStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&IngestionStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
