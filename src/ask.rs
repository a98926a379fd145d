//! Grounded question answering over retrieved context

use crate::error::Result;
use crate::llm::{system_message, user_message, ChatClient, GenerationOptions, TokenUsage};
use crate::retrieval::{RetrievalEngine, SearchMetadata, SearchOptions, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Displayed source content is cut at this many code points
const SOURCE_PREVIEW_CHARS: usize = 200;

const GROUNDED_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions from \
retrieved document context. Answer using only the provided context; if the context is \
insufficient, say so plainly. Answer in the same language as the question. Cite the documents \
you drew from by their bracketed names.";

const EMPTY_ANSWER_EN: &str = "I'm sorry, I couldn't find any relevant information in the \
indexed documents to answer your question.";

const EMPTY_ANSWER_TH: &str =
    "ขออภัย ไม่พบข้อมูลที่เกี่ยวข้องในเอกสารที่จัดทำดัชนีไว้สำหรับคำถามของคุณ";

/// A question with retrieval and generation knobs
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub limit: usize,
    pub threshold: f32,
    /// Model override for this request
    pub model: Option<String>,
    pub rerank: bool,
    pub expand: bool,
    pub hyde: bool,
}

impl Default for AskRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            limit: 5,
            threshold: 0.0,
            model: None,
            rerank: false,
            expand: false,
            hyde: false,
        }
    }
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }
}

/// A deduplicated, score-shaped source reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskSource {
    pub filename: String,
    pub filepath: String,
    /// Clamped to [0, 1] and rounded to 3 decimals
    pub score: f32,
    /// At most 200 code points, with `...` appended when truncated
    pub content: String,
}

/// The grounded answer with its supporting sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<AskSource>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub metadata: SearchMetadata,
}

/// Answers questions grounded in retrieved chunks
pub struct AskEngine {
    retrieval: Arc<RetrievalEngine>,
    chat: Arc<dyn ChatClient>,
    default_model: String,
}

impl AskEngine {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        chat: Arc<dyn ChatClient>,
        default_model: String,
    ) -> Self {
        Self {
            retrieval,
            chat,
            default_model,
        }
    }

    /// Retrieve context and generate a grounded answer.
    ///
    /// Empty retrieval is not an error: a canned apology is returned,
    /// localized to Thai when the question contains Thai code points.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let options = SearchOptions {
            limit: request.limit,
            threshold: request.threshold,
            rerank: request.rerank,
            expand: request.expand,
            hyde: request.hyde,
            filter: None,
        };

        let (results, metadata) = self
            .retrieval
            .search_with_metadata(&request.question, &options)
            .await?;

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        if results.is_empty() {
            info!("No retrieval results, returning canned answer");
            let answer = if contains_thai(&request.question) {
                EMPTY_ANSWER_TH
            } else {
                EMPTY_ANSWER_EN
            };
            return Ok(AskResponse {
                answer: answer.to_string(),
                sources: Vec::new(),
                model,
                usage: None,
                metadata,
            });
        }

        let context = build_context(&results);
        debug!(
            results = results.len(),
            context_chars = context.len(),
            "Assembled context"
        );

        let messages = [
            system_message(GROUNDED_SYSTEM_PROMPT),
            user_message(format!(
                "Context:\n{context}\n\nQuestion: {}",
                request.question
            )),
        ];
        let generation = self
            .chat
            .generate(
                &messages,
                &GenerationOptions {
                    model: request.model.clone(),
                    ..Default::default()
                },
            )
            .await?;

        Ok(AskResponse {
            answer: generation.text,
            sources: shape_sources(&results),
            model: generation.model,
            usage: generation.usage,
            metadata,
        })
    }
}

/// True when the text contains any Thai code point (U+0E00..U+0E7F)
fn contains_thai(text: &str) -> bool {
    text.chars()
        .any(|c| ('\u{0E00}'..='\u{0E7F}').contains(&c))
}

/// `[Document k: <filename>]` blocks separated by `---` lines
fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "[Document {}: {}]\n{}",
                i + 1,
                result.document.filename,
                result.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Deduplicate by filepath keeping the best score, sort by score, clamp and
/// round scores, and truncate previews
fn shape_sources(results: &[SearchResult]) -> Vec<AskSource> {
    let mut best: HashMap<&str, &SearchResult> = HashMap::new();
    for result in results {
        best.entry(result.document.filepath.as_str())
            .and_modify(|kept| {
                if result.score > kept.score {
                    *kept = result;
                }
            })
            .or_insert(result);
    }

    let mut sources: Vec<AskSource> = best
        .into_values()
        .map(|result| AskSource {
            filename: result.document.filename.clone(),
            filepath: result.document.filepath.clone(),
            score: round3(result.score.clamp(0.0, 1.0)),
            content: truncate_preview(&result.content),
        })
        .collect();

    sources.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sources
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

fn truncate_preview(content: &str) -> String {
    if content.chars().count() <= SOURCE_PREVIEW_CHARS {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(SOURCE_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FileType;
    use crate::retrieval::DocumentRef;
    use uuid::Uuid;

    fn result(filepath: &str, score: f32, content: &str) -> SearchResult {
        let document_id = Uuid::new_v4();
        SearchResult {
            chunk_id: Uuid::new_v4(),
            document_id,
            content: content.to_string(),
            score,
            document: DocumentRef {
                id: document_id,
                filename: filepath.rsplit('/').next().unwrap().to_string(),
                filepath: filepath.to_string(),
                file_type: FileType::Txt,
            },
        }
    }

    #[test]
    fn test_thai_detection() {
        assert!(contains_thai("คำถาม"));
        assert!(contains_thai("mixed คำ text"));
        assert!(!contains_thai("plain english"));
        assert!(!contains_thai("日本語"));
    }

    #[test]
    fn test_context_blocks() {
        let results = vec![result("/a.txt", 0.9, "alpha"), result("/b.txt", 0.8, "beta")];
        let context = build_context(&results);
        assert!(context.starts_with("[Document 1: a.txt]\nalpha"));
        assert!(context.contains("\n---\n[Document 2: b.txt]\nbeta"));
    }

    #[test]
    fn test_sources_dedup_keeps_max_score() {
        let results = vec![
            result("/a.txt", 0.4, "low"),
            result("/a.txt", 0.9, "high"),
            result("/b.txt", 0.6, "other"),
        ];
        let sources = shape_sources(&results);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].filepath, "/a.txt");
        assert_eq!(sources[0].score, 0.9);
        assert_eq!(sources[0].content, "high");
        assert_eq!(sources[1].filepath, "/b.txt");
    }

    #[test]
    fn test_scores_clamped_and_rounded() {
        let results = vec![
            result("/a.txt", 1.7, "x"),
            result("/b.txt", -0.3, "y"),
            result("/c.txt", 0.123456, "z"),
        ];
        let sources = shape_sources(&results);
        let by_path: HashMap<_, _> = sources
            .iter()
            .map(|s| (s.filepath.as_str(), s.score))
            .collect();
        assert_eq!(by_path["/a.txt"], 1.0);
        assert_eq!(by_path["/b.txt"], 0.0);
        assert_eq!(by_path["/c.txt"], 0.123);
    }

    #[test]
    fn test_preview_truncation() {
        let long: String = "é".repeat(250);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), SOURCE_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));

        let short = truncate_preview("fits");
        assert_eq!(short, "fits");
    }
}
