//! End-to-end ingestion, retrieval, and ask pipeline tests


use ragline::{
    AskRequest, DocumentStatus, IndexOptions, IngestionStatus, SearchOptions,
};
use std::sync::Arc;
use test_helpers::{mount_chat_answer, test_engine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_index_text_then_search() {
    let (engine, _server) = test_engine().await;

    let content = "Hello world. ".repeat(100);
    let result = engine.index_text(&content, "Greeting", None).await;
    assert_eq!(result.status, IngestionStatus::Success);
    assert!(result.chunk_count >= 1);
    assert!(result.error.is_none());

    let doc = engine.get_document(result.document_id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Indexed);
    assert_eq!(doc.chunk_count, result.chunk_count);
    assert!(doc.filepath.starts_with("memory://"));
    assert!(doc.indexed_at.is_some());

    let hits = engine
        .search("greeting hello", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].document.filename, "Greeting");
    assert_eq!(hits[0].document_id, result.document_id);
}

#[tokio::test]
async fn test_index_text_rejects_empty_content() {
    let (engine, _server) = test_engine().await;

    let result = engine.index_text("   \n\t  ", "Empty", None).await;
    assert_eq!(result.status, IngestionStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("No content to index"));
    assert_eq!(engine.stats().await.unwrap().documents, 0);
}

#[tokio::test]
async fn test_reingest_unchanged_path_is_noop() {
    let (engine, _server) = test_engine().await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.md");
    std::fs::write(&file, "# T\nx").unwrap();

    let first = engine.index_document(&file, IndexOptions::default()).await;
    assert_eq!(first.status, IngestionStatus::Success);
    assert_eq!(first.chunk_count, 1);

    let second = engine.index_document(&file, IndexOptions::default()).await;
    assert_eq!(second.status, IngestionStatus::Success);
    assert_eq!(second.document_id, first.document_id);
    assert_eq!(second.chunk_count, 1);

    // No new chunks, no new vectors, one document
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.vectors, 1);
}

#[tokio::test]
async fn test_force_reindex_replaces_document() {
    let (engine, _server) = test_engine().await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.md");
    std::fs::write(&file, "# T\noriginal body").unwrap();

    let first = engine.index_document(&file, IndexOptions::default()).await;
    assert_eq!(first.status, IngestionStatus::Success);

    std::fs::write(&file, "# T\nrewritten body with different words").unwrap();
    let second = engine
        .index_document(
            &file,
            IndexOptions {
                force_reindex: true,
                ..Default::default()
            },
        )
        .await;
    assert_eq!(second.status, IngestionStatus::Success);
    assert_ne!(second.document_id, first.document_id);

    // Old document and its vectors are gone
    assert!(engine.get_document(first.document_id).await.unwrap().is_none());
    let hits = engine
        .search("rewritten body words", &SearchOptions { limit: 10, ..Default::default() })
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.document_id != first.document_id));
    assert!(hits.iter().any(|h| h.document_id == second.document_id));

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
}

#[tokio::test]
async fn test_changed_checksum_triggers_reindex_without_force() {
    let (engine, _server) = test_engine().await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "first version of the notes").unwrap();

    let first = engine.index_document(&file, IndexOptions::default()).await;
    std::fs::write(&file, "second version, now with extra words").unwrap();
    let second = engine.index_document(&file, IndexOptions::default()).await;

    assert_eq!(second.status, IngestionStatus::Success);
    assert_ne!(second.document_id, first.document_id);
    assert_eq!(engine.stats().await.unwrap().documents, 1);
}

#[tokio::test]
async fn test_delete_document_clears_all_state() {
    let (engine, _server) = test_engine().await;

    let result = engine
        .index_text(&"Vector cleanup test content. ".repeat(50), "Cleanup", None)
        .await;
    assert_eq!(result.status, IngestionStatus::Success);

    let removed = engine.delete_document(result.document_id).await.unwrap();
    assert!(removed);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.vectors, 0);

    let hits = engine
        .search("cleanup test content", &SearchOptions::default())
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.document_id != result.document_id));

    // Deleting again reports nothing removed
    assert!(!engine.delete_document(result.document_id).await.unwrap());
}

#[tokio::test]
async fn test_unsupported_extension_fails_without_row() {
    let (engine, _server) = test_engine().await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("binary.exe");
    std::fs::write(&file, b"MZ").unwrap();

    let result = engine.index_document(&file, IndexOptions::default()).await;
    assert_eq!(result.status, IngestionStatus::Failed);
    assert!(result.error.unwrap().contains("unsupported file type"));
    assert_eq!(engine.stats().await.unwrap().documents, 0);
}

#[tokio::test]
async fn test_embedding_failure_marks_document_failed_without_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("embedder down"))
        .mount(&server)
        .await;

    let engine = ragline::Engine::builder(test_helpers::test_config(&server.uri()))
        .with_vector_store(Arc::new(ragline::InMemoryVectorStore::new()))
        .build()
        .await
        .unwrap();
    engine.initialize().await.unwrap();

    let result = engine
        .index_text("some content that will fail to embed", "Doomed", None)
        .await;
    assert_eq!(result.status, IngestionStatus::Failed);

    // The failed row survives with the diagnosis; no vectors exist
    let doc = engine.get_document(result.document_id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(doc.metadata.contains_key("error"));
    assert_eq!(engine.stats().await.unwrap().vectors, 0);
}

#[tokio::test]
async fn test_embedding_count_mismatch_is_fatal() {
    let server = MockServer::start().await;
    // Always one vector back, regardless of input size
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": vec![0.5f32; test_helpers::TEST_DIMENSION]}]
        })))
        .mount(&server)
        .await;

    let engine = ragline::Engine::builder(test_helpers::test_config(&server.uri()))
        .with_vector_store(Arc::new(ragline::InMemoryVectorStore::new()))
        .build()
        .await
        .unwrap();
    engine.initialize().await.unwrap();

    // Enough distinct paragraphs to produce more than one chunk
    let content = (0..40)
        .map(|i| format!("Paragraph number {i} with a reasonable amount of filler text."))
        .collect::<Vec<_>>()
        .join("\n\n");
    let result = engine.index_text(&content, "Mismatch", None).await;

    assert_eq!(result.status, IngestionStatus::Failed);
    assert!(result.error.unwrap().contains("Embedding count mismatch"));

    let doc = engine.get_document(result.document_id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(engine.stats().await.unwrap().vectors, 0);
}

#[tokio::test]
async fn test_concurrent_ingestion_of_same_path_yields_one_document() {
    let (engine, _server) = test_engine().await;
    let engine = Arc::new(engine);

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shared.txt");
    std::fs::write(&file, "contended content that everyone ingests at once").unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let file = file.clone();
        handles.push(tokio::spawn(async move {
            engine.index_document(&file, IndexOptions::default()).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.status, IngestionStatus::Success);
        ids.push(result.document_id);
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1, "all ingestions must converge on one document");
    assert_eq!(engine.stats().await.unwrap().documents, 1);
}

#[tokio::test]
async fn test_ask_empty_index_returns_english_apology() {
    let (engine, _server) = test_engine().await;

    let response = engine.ask(AskRequest::new("foo bar")).await.unwrap();
    assert!(response.answer.contains("couldn't find"));
    assert!(response.sources.is_empty());
}

#[tokio::test]
async fn test_ask_empty_index_returns_thai_apology() {
    let (engine, _server) = test_engine().await;

    let response = engine.ask(AskRequest::new("คำถาม")).await.unwrap();
    assert!(response.answer.contains("ไม่พบ"));
    assert!(response.sources.is_empty());
}

#[tokio::test]
async fn test_ask_grounded_answer_with_sources() {
    let (engine, server) = test_engine().await;
    mount_chat_answer(&server, "Grounded answer citing Document 1.").await;

    let result = engine
        .index_text(
            &"Ragline is a retrieval engine for documents. ".repeat(30),
            "About",
            None,
        )
        .await;
    assert_eq!(result.status, IngestionStatus::Success);

    let response = engine
        .ask(AskRequest::new("what is ragline retrieval engine"))
        .await
        .unwrap();

    assert_eq!(response.answer, "Grounded answer citing Document 1.");
    assert!(!response.sources.is_empty());
    assert_eq!(response.model, "test-chat");
    assert_eq!(response.usage.unwrap().total_tokens, 25);

    // Source shaping bounds
    let mut seen = std::collections::HashSet::new();
    for source in &response.sources {
        assert!(seen.insert(source.filepath.clone()), "sources deduplicated");
        assert!((0.0..=1.0).contains(&source.score));
        assert!(source.content.chars().count() <= 203);
    }
}

#[tokio::test]
async fn test_search_empty_query_returns_nothing() {
    let (engine, _server) = test_engine().await;
    engine
        .index_text("some indexed content here", "Doc", None)
        .await;

    let (hits, meta) = engine
        .search_with_metadata("   ", &SearchOptions::default())
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert!(!meta.query_expanded);
    assert!(!meta.hyde_used);
    assert!(!meta.rerank_used);
}

#[tokio::test]
async fn test_indexed_invariants_hold() {
    let (engine, _server) = test_engine().await;

    let content = (0..20)
        .map(|i| format!("Section {i} talks about topic {i} in enough words to matter."))
        .collect::<Vec<_>>()
        .join("\n\n");
    let result = engine.index_text(&content, "Invariants", None).await;
    assert_eq!(result.status, IngestionStatus::Success);

    let doc = engine.get_document(result.document_id).await.unwrap().unwrap();
    let stats = engine.stats().await.unwrap();

    // chunk_count == |chunks| == |vectors|
    assert_eq!(doc.chunk_count, result.chunk_count);
    assert_eq!(stats.chunks, doc.chunk_count);
    assert_eq!(stats.vectors as i64, doc.chunk_count);
}
