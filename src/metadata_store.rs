//! Metadata store: documents and chunks in SQLite via sqlx

use crate::document::{Chunk, Document, DocumentStatus, FileType, MetaMap};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The transactional decision that serializes concurrent ingestions of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestIntent {
    /// Same path, same checksum, no force: nothing to do
    Existing { id: Uuid, chunk_count: i64 },
    /// Path exists with a different checksum, or reindex was forced
    Reindex { old_id: Uuid },
    /// Fresh path; a pending row now exists under this id
    New { id: Uuid },
}

/// Partial update applied to a document row
#[derive(Debug, Default, Clone)]
pub struct DocumentPatch {
    pub status: Option<DocumentStatus>,
    pub chunk_count: Option<i64>,
    pub checksum: Option<String>,
    pub metadata: Option<MetaMap>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub indexed_at: Option<DateTime<Utc>>,
}

enum Bind {
    Text(String),
    Int(i64),
}

/// SQLite-backed document/chunk store
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Connect to the database, creating the file and its directory if needed
    pub async fn connect(database_url: &str) -> Result<Self> {
        if let Some(db_path) = database_url.strip_prefix("sqlite:") {
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if db_path != ":memory:" {
                if let Some(parent) = std::path::Path::new(db_path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            StoreError::Metadata(format!(
                                "Failed to create database directory: {e}"
                            ))
                        })?;
                    }
                }
            }
        }

        let database_url = if database_url.contains('?') {
            if !database_url.contains("mode=") {
                format!("{database_url}&mode=rwc")
            } else {
                database_url.to_string()
            }
        } else {
            format!("{database_url}?mode=rwc")
        };

        // An in-memory database lives in exactly one connection; a wider pool
        // would hand each connection its own empty database.
        let pool = if database_url.contains(":memory:") {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&database_url)
                .await?
        } else {
            SqlitePool::connect(&database_url).await?
        };
        Ok(Self { pool })
    }

    /// Run schema migrations and enable WAL + referential integrity; idempotent
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing metadata store");

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filepath TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT '',
                size_bytes INTEGER NOT NULL DEFAULT 0,
                checksum TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                chunk_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                summary TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                indexed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_document_index \
             ON chunks(document_id, chunk_index)",
        )
        .execute(&self.pool)
        .await?;

        info!("Metadata store initialized");
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Decide the ingestion intent for a path inside one transaction.
    ///
    /// The UNIQUE filepath constraint is the serialization point: of several
    /// concurrent ingestions of the same path, exactly one observes `New`;
    /// the rest land on `Existing` or `Reindex`.
    pub async fn resolve_ingest_intent(
        &self,
        template: &Document,
        checksum: &str,
        force_reindex: bool,
    ) -> Result<IngestIntent> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, checksum, status, chunk_count FROM documents WHERE filepath = ?1",
        )
        .bind(&template.filepath)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = row {
            let intent = Self::intent_for_existing(&row, checksum, force_reindex)?;
            tx.commit().await?;
            return Ok(intent);
        }

        let now = Utc::now().to_rfc3339();
        let inserted = sqlx::query(
            r#"
            INSERT INTO documents
                (id, filepath, filename, file_type, mime_type, size_bytes, checksum,
                 status, chunk_count, metadata, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, '{}', '[]', ?8, ?8)
            ON CONFLICT(filepath) DO NOTHING
            "#,
        )
        .bind(template.id.to_string())
        .bind(&template.filepath)
        .bind(&template.filename)
        .bind(template.file_type.as_str())
        .bind(&template.mime_type)
        .bind(template.size_bytes)
        .bind(checksum)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let intent = if inserted.rows_affected() == 1 {
            IngestIntent::New { id: template.id }
        } else {
            // Lost the race: another ingestion created the row first
            let row = sqlx::query(
                "SELECT id, checksum, status, chunk_count FROM documents WHERE filepath = ?1",
            )
            .bind(&template.filepath)
            .fetch_one(&mut *tx)
            .await?;
            Self::intent_for_existing(&row, checksum, force_reindex)?
        };

        tx.commit().await?;
        Ok(intent)
    }

    fn intent_for_existing(row: &SqliteRow, checksum: &str, force_reindex: bool) -> Result<IngestIntent> {
        let id = parse_uuid(row.get("id"))?;
        let existing_checksum: Option<String> = row.get("checksum");
        let status: String = row.get("status");
        let chunk_count: i64 = row.get("chunk_count");

        // A failed document never dedups against its checksum; retrying the
        // same bytes must take the reindex path.
        let failed = status == DocumentStatus::Failed.as_str();

        if !force_reindex && !failed && existing_checksum.as_deref() == Some(checksum) {
            Ok(IngestIntent::Existing { id, chunk_count })
        } else {
            Ok(IngestIntent::Reindex { old_id: id })
        }
    }

    /// Insert a document row as-is (used for virtual paths with fresh ids)
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, filepath, filename, file_type, mime_type, size_bytes, checksum,
                 status, chunk_count, metadata, summary, tags, created_at, updated_at, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.filepath)
        .bind(&doc.filename)
        .bind(doc.file_type.as_str())
        .bind(&doc.mime_type)
        .bind(doc.size_bytes)
        .bind(doc.checksum.as_deref())
        .bind(doc.status.as_str())
        .bind(doc.chunk_count)
        .bind(serde_json::to_string(&doc.metadata)?)
        .bind(doc.summary.as_deref())
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.updated_at.to_rfc3339())
        .bind(doc.indexed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        debug!(document_id = %doc.id, filepath = %doc.filepath, "Inserted document");
        Ok(())
    }

    /// Apply a partial update to a document row
    pub async fn update_document(&self, id: Uuid, patch: DocumentPatch) -> Result<()> {
        let mut sets: Vec<&'static str> = Vec::new();
        let mut binds: Vec<Bind> = Vec::new();

        if let Some(status) = patch.status {
            sets.push("status = ?");
            binds.push(Bind::Text(status.as_str().to_string()));
        }
        if let Some(chunk_count) = patch.chunk_count {
            sets.push("chunk_count = ?");
            binds.push(Bind::Int(chunk_count));
        }
        if let Some(checksum) = patch.checksum {
            sets.push("checksum = ?");
            binds.push(Bind::Text(checksum));
        }
        if let Some(metadata) = patch.metadata {
            sets.push("metadata = ?");
            binds.push(Bind::Text(serde_json::to_string(&metadata)?));
        }
        if let Some(summary) = patch.summary {
            sets.push("summary = ?");
            binds.push(Bind::Text(summary));
        }
        if let Some(tags) = patch.tags {
            sets.push("tags = ?");
            binds.push(Bind::Text(serde_json::to_string(&tags)?));
        }
        if let Some(indexed_at) = patch.indexed_at {
            sets.push("indexed_at = ?");
            binds.push(Bind::Text(indexed_at.to_rfc3339()));
        }

        if sets.is_empty() {
            return Ok(());
        }

        sets.push("updated_at = ?");
        binds.push(Bind::Text(Utc::now().to_rfc3339()));

        let sql = format!("UPDATE documents SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = match bind {
                Bind::Text(value) => query.bind(value),
                Bind::Int(value) => query.bind(value),
            };
        }
        query = query.bind(id.to_string());

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            warn!(document_id = %id, "No document found to update");
        }
        Ok(())
    }

    /// Fetch a document by id
    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| document_from_row(&r)).transpose()
    }

    /// Fetch a document by its (unique) path
    pub async fn get_document_by_path(&self, filepath: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE filepath = ?1")
            .bind(filepath)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| document_from_row(&r)).transpose()
    }

    /// Batched lookup of documents by path
    pub async fn get_documents_by_paths(&self, paths: &[String]) -> Result<Vec<Document>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let sql = format!("SELECT * FROM documents WHERE filepath IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for path in paths {
            query = query.bind(path);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Delete a document row (chunks cascade); returns whether a row was removed
    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            debug!(document_id = %id, "Deleted document");
        }
        Ok(removed)
    }

    /// List documents, newest first
    pub async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Total number of document rows
    pub async fn count_documents(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Insert all chunks of a document in one transaction
    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, chunk_index, content, start_offset, end_offset,
                     token_count, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(chunk.id.to_string())
            .bind(chunk.document_id.to_string())
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.token_count)
            .bind(serde_json::to_string(&chunk.metadata)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Inserted {} chunks", chunks.len());
        Ok(())
    }

    /// Fetch a document's chunks ordered by index
    pub async fn get_chunks_by_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// Batched chunk lookup by id
    pub async fn get_chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM chunks WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// Delete a document's chunks directly (the FK cascade also covers this)
    pub async fn delete_chunks_by_document(&self, document_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of chunk rows referencing a document
    pub async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM chunks WHERE document_id = ?1")
            .bind(document_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Total number of chunk rows
    pub async fn count_all_chunks(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

fn parse_uuid(raw: String) -> Result<Uuid> {
    Uuid::parse_str(&raw).map_err(|e| StoreError::Metadata(format!("bad uuid {raw}: {e}")).into())
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Metadata(format!("bad timestamp {raw}: {e}")).into())
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let file_type_raw: String = row.get("file_type");
    let status_raw: String = row.get("status");
    let metadata_json: String = row.get("metadata");
    let tags_json: String = row.get("tags");
    let indexed_at: Option<String> = row.get("indexed_at");

    Ok(Document {
        id: parse_uuid(row.get("id"))?,
        filepath: row.get("filepath"),
        filename: row.get("filename"),
        file_type: file_type_raw
            .parse::<FileType>()
            .map_err(StoreError::Metadata)?,
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        checksum: row.get("checksum"),
        status: status_raw
            .parse::<DocumentStatus>()
            .map_err(StoreError::Metadata)?,
        chunk_count: row.get("chunk_count"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        summary: row.get("summary"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
        indexed_at: indexed_at.map(parse_timestamp).transpose()?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let metadata_json: String = row.get("metadata");
    Ok(Chunk {
        id: parse_uuid(row.get("id"))?,
        document_id: parse_uuid(row.get("document_id"))?,
        content: row.get("content"),
        chunk_index: row.get("chunk_index"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        token_count: row.get("token_count"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}
