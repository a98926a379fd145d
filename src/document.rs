//! Core data model: documents, chunks, and parsed content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Supported source file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Txt,
    Md,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Csv,
    Html,
    Json,
    Rtf,
}

impl FileType {
    /// Resolve a file type from a (case-insensitive) extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Md),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            "json" => Some(Self::Json),
            "rtf" => Some(Self::Rtf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Json => "json",
            Self::Rtf => "rtf",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unknown file type: {s}"))
    }
}

/// Lifecycle status of an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// Open-schema metadata value.
///
/// Parsed-document metadata is a tagged union of primitives and arrays of
/// primitives so the store serializer stays total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<MetaValue>),
}

/// Free-form metadata mapping attached to documents and chunks
pub type MetaMap = HashMap<String, MetaValue>;

impl MetaValue {
    /// Borrow the inner string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render any value as display text
    pub fn to_string_lossy(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(MetaValue::to_string_lossy)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(items: Vec<String>) -> Self {
        Self::Array(items.into_iter().map(MetaValue::String).collect())
    }
}

/// A document tracked by the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Original path or virtual source URI; unique across the store
    pub filepath: String,
    pub filename: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub size_bytes: i64,
    /// SHA-256 of the raw bytes, hex-encoded; present once status leaves pending
    pub checksum: Option<String>,
    pub status: DocumentStatus,
    pub chunk_count: i64,
    pub metadata: MetaMap,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Create a fresh pending document for a source path
    pub fn new(filepath: String, filename: String, file_type: FileType, mime_type: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filepath,
            filename,
            file_type,
            mime_type,
            size_bytes: 0,
            checksum: None,
            status: DocumentStatus::Pending,
            chunk_count: 0,
            metadata: MetaMap::new(),
            summary: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            indexed_at: None,
        }
    }
}

/// A bounded substring of a document's normalized text, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    /// Dense 0-based position within the owning document
    pub chunk_index: i64,
    /// Byte range within the normalized source text
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
    pub metadata: MetaMap,
}

/// A parsed source document, not persisted; consumed by the chunker
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Normalized text of the whole document
    pub content: String,
    /// Extracted document-level metadata (title, author, tags, ...)
    pub metadata: MetaMap,
    /// Best-effort structural sections
    pub sections: Vec<Section>,
}

/// A structural unit of a parsed document (heading span, page, slide, sheet, row)
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub title: Option<String>,
    pub content: String,
    /// Page or slide number, when the format carries one
    pub page: Option<u32>,
}
