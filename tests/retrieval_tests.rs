//! Retrieval coordinator tests: rerank reconciliation and transformer fallback


use async_trait::async_trait;
use ragline::{
    ChatClient, CollectionInfo, EmbeddingClient, FileType, GenerationOptions, GenerationResponse,
    MetadataStore, QueryConfig, QueryTransformer, RagConfig, RerankerClient, RerankerConfig,
    Result, RetrievalEngine, ScoredPoint, SearchFilter, SearchOptions, VectorPayload, VectorPoint,
    VectorStore,
};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Vector store returning a fixed candidate list, for score bookkeeping tests
struct StubVectorStore {
    hits: Vec<ScoredPoint>,
}

#[async_trait]
impl VectorStore for StubVectorStore {
    async fn ensure_collection(&self, _dimension: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _points: Vec<VectorPoint>) -> Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        _query: &[f32],
        limit: usize,
        _score_threshold: f32,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn delete_by_document(&self, _document_id: Uuid) -> Result<()> {
        Ok(())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        Ok(CollectionInfo {
            vector_count: self.hits.len() as u64,
            status: "green".to_string(),
        })
    }
}

struct StubEmbedder;

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Chat client that always fails, to exercise transformer fallback
struct DownChat;

#[async_trait]
impl ChatClient for DownChat {
    async fn generate(
        &self,
        _messages: &[ragline::Message],
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        Err(ragline::LlmError::ConnectionFailed("down".to_string()).into())
    }
}

fn hit(score: f32, index: i64) -> ScoredPoint {
    let document_id = Uuid::new_v4();
    ScoredPoint {
        chunk_id: Uuid::new_v4(),
        score,
        payload: VectorPayload {
            document_id,
            filename: format!("doc{index}.txt"),
            filepath: format!("/tmp/doc{index}.txt"),
            file_type: FileType::Txt,
            chunk_index: index,
            content: Some(format!("candidate content {index}")),
        },
    }
}

async fn stub_engine(
    hits: Vec<ScoredPoint>,
    reranker_base_url: &str,
) -> RetrievalEngine {
    let metadata = Arc::new(MetadataStore::connect("sqlite::memory:").await.unwrap());
    metadata.initialize().await.unwrap();

    let reranker = RerankerClient::new(RerankerConfig {
        enabled: true,
        base_url: reranker_base_url.to_string(),
        model: "test-rerank".to_string(),
        candidate_multiplier: 3,
        timeout: 5,
    })
    .unwrap();

    let transformer = QueryTransformer::new(Arc::new(DownChat), QueryConfig::default());

    RetrievalEngine::new(
        Arc::new(StubEmbedder),
        Arc::new(StubVectorStore { hits }),
        metadata,
        Arc::new(reranker),
        Arc::new(transformer),
    )
}

#[tokio::test]
async fn test_rerank_sentinel_preserves_vector_score() {
    let server = MockServer::start().await;
    // Reranker has no opinion on index 0, scores index 1 at 0.85
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"index": 0, "relevance_score": -1.0},
                {"index": 1, "relevance_score": 0.85}
            ]
        })))
        .mount(&server)
        .await;

    let engine = stub_engine(vec![hit(0.8, 0), hit(0.7, 1), hit(0.6, 2)], &server.uri()).await;
    let (results, meta) = engine
        .search_with_metadata(
            "query",
            &SearchOptions {
                limit: 2,
                rerank: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(meta.rerank_used);
    assert_eq!(results.len(), 2);
    // Sentinel kept the 0.8 vector score; the real score replaced 0.7
    assert_eq!(results[0].score, 0.8);
    assert_eq!(results[1].score, 0.85);
    assert_eq!(results[0].content, "candidate content 0");
    assert_eq!(results[1].content, "candidate content 1");
}

#[tokio::test]
async fn test_rerank_failure_keeps_vector_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = stub_engine(vec![hit(0.9, 0), hit(0.8, 1), hit(0.7, 2)], &server.uri()).await;
    let (results, meta) = engine
        .search_with_metadata(
            "query",
            &SearchOptions {
                limit: 2,
                rerank: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(meta.rerank_used);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].score, 0.9);
    assert_eq!(results[1].score, 0.8);
}

#[tokio::test]
async fn test_rerank_skipped_when_candidates_fit_limit() {
    // No rerank server running: the call must not happen
    let engine = stub_engine(vec![hit(0.9, 0), hit(0.8, 1)], "http://localhost:1").await;
    let (results, meta) = engine
        .search_with_metadata(
            "query",
            &SearchOptions {
                limit: 5,
                rerank: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].score, 0.9);
    assert!(!meta.rerank_used);
}

#[tokio::test]
async fn test_transform_failures_fall_back_to_original_query() {
    // Chat client is down; expansion and HyDE must silently fall back
    let engine = stub_engine(vec![hit(0.9, 0)], "http://localhost:1").await;

    let (results, meta) = engine
        .search_with_metadata(
            "how does the chunker handle paragraph overlap",
            &SearchOptions {
                expand: true,
                hyde: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(!meta.hyde_used, "failed HyDE must not be reported as used");
    assert!(!meta.query_expanded);
    assert_eq!(
        meta.original_query,
        "how does the chunker handle paragraph overlap"
    );
}

#[tokio::test]
async fn test_rerank_with_live_pipeline_overfetches() {
    // Full engine path: index several documents, then rerank down to two
    let (engine, server) = test_helpers::test_engine().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"index": 1, "relevance_score": 0.95},
                {"index": 0, "relevance_score": 0.5}
            ]
        })))
        .mount(&server)
        .await;

    for i in 0..4 {
        let result = engine
            .index_text(
                &format!("shared topic words plus unique marker {i}. ").repeat(20),
                &format!("Doc {i}"),
                None,
            )
            .await;
        assert_eq!(result.status, ragline::IngestionStatus::Success);
    }

    let (results, meta) = engine
        .search_with_metadata(
            "shared topic words",
            &SearchOptions {
                limit: 2,
                rerank: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(meta.rerank_used);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].score, 0.95);
}

#[tokio::test]
async fn test_default_config_roundtrip_for_stub_suite() {
    // Keeps the stub suite honest about the real defaults it bypasses
    let config = RagConfig::default();
    assert_eq!(config.reranker.candidate_multiplier, 3);
    assert!(config.query.enable_expansion);
    assert!(config.query.enable_hyde);
}
