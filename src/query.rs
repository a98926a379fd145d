//! Query transformation: LLM expansion and hypothetical-document retrieval

use crate::config::QueryConfig;
use crate::llm::{system_message, user_message, ChatClient, GenerationOptions};
use std::sync::Arc;
use tracing::debug;

const EXPANSION_PROMPT: &str = "You rewrite search queries for a document retrieval system. \
Rewrite the user's query to be more specific and add closely related terms. \
Reply with the rewritten query only, on a single line.";

const HYDE_PROMPT: &str = "You write short hypothetical passages for a document retrieval system. \
Write a brief factual paragraph that would plausibly answer the user's question. \
Reply with the passage only.";

/// Transforms a query before retrieval.
///
/// Both modes fail soft: any error returns the original query unchanged so
/// retrieval still proceeds.
pub struct QueryTransformer {
    chat: Arc<dyn ChatClient>,
    config: QueryConfig,
}

impl QueryTransformer {
    pub fn new(chat: Arc<dyn ChatClient>, config: QueryConfig) -> Self {
        Self { chat, config }
    }

    pub fn expansion_enabled(&self) -> bool {
        self.config.enable_expansion
    }

    pub fn hyde_enabled(&self) -> bool {
        self.config.enable_hyde
    }

    /// Rewrite a query via the LLM; returns the input unchanged if disabled
    /// or on error
    pub async fn expand(&self, query: &str) -> String {
        if !self.config.enable_expansion {
            return query.to_string();
        }

        let messages = [system_message(EXPANSION_PROMPT), user_message(query)];
        let options = GenerationOptions {
            temperature: Some(0.2),
            max_tokens: Some(120),
            ..Default::default()
        };

        match self.chat.generate(&messages, &options).await {
            Ok(response) => {
                let expanded = response.text.trim().to_string();
                if expanded.is_empty() {
                    query.to_string()
                } else {
                    debug!(original = query, expanded = %expanded, "Expanded query");
                    expanded
                }
            }
            Err(e) => {
                debug!("Query expansion failed, using original: {}", e);
                query.to_string()
            }
        }
    }

    /// Generate a hypothetical answer document for retrieval; returns the
    /// input unchanged if disabled or on error
    pub async fn hyde(&self, query: &str) -> String {
        if !self.config.enable_hyde {
            return query.to_string();
        }

        let messages = [system_message(HYDE_PROMPT), user_message(query)];
        let options = GenerationOptions {
            temperature: Some(0.4),
            max_tokens: Some(250),
            ..Default::default()
        };

        match self.chat.generate(&messages, &options).await {
            Ok(response) => {
                let document = response.text.trim().to_string();
                if document.is_empty() {
                    query.to_string()
                } else {
                    debug!(original = query, "Generated hypothetical document");
                    document
                }
            }
            Err(e) => {
                debug!("HyDE generation failed, using original: {}", e);
                query.to_string()
            }
        }
    }

    /// Whether a query is a good HyDE candidate.
    ///
    /// Declines very short queries and keyword-only queries, where a
    /// synthesized passage tends to drift off-topic.
    pub fn should_use_hyde(&self, query: &str) -> bool {
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.len() < 4 {
            return false;
        }

        let has_letters = query.chars().any(|c| c.is_alphabetic());
        if !has_letters {
            return false;
        }

        // All-caps strings read as keyword or identifier searches
        let all_caps = query
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase());
        !all_caps
    }
}
