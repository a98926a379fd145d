//! Chat language model integration (OpenAI-compatible endpoint)

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Message role in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Token accounting reported by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response from text generation
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Per-call generation overrides
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Model override; the configured default applies when absent
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Trait for chat completion
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate text from a conversation
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResponse>;
}

/// OpenAI-compatible chat client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiChatClient {
    /// Create a new chat client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        debug!("Generating text with {} messages", messages.len());

        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };

        let url = self.api_url("chat/completions");
        debug!("Making request to: {}", url);

        let response = timeout(
            Duration::from_secs(self.config.timeout),
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Chat API error: {}", error_text);
            return Err(LlmError::GenerationFailed(error_text).into());
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        if choice.message.content.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty content".to_string()).into());
        }

        Ok(GenerationResponse {
            text: choice.message.content,
            model: completion.model.unwrap_or_else(|| model.to_string()),
            usage: completion.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Helper function to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

/// Helper function to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{automock, predicate};

    #[automock]
    #[async_trait]
    #[allow(dead_code)]
    pub trait MockableChatClient: Send + Sync {
        async fn generate(
            &self,
            messages: Vec<Message>,
            options: GenerationOptions,
        ) -> Result<GenerationResponse>;
    }

    #[tokio::test]
    async fn test_mock_chat_client() {
        let mut mock = MockMockableChatClient::new();
        mock.expect_generate()
            .with(predicate::always(), predicate::always())
            .times(1)
            .returning(|_, _| {
                Ok(GenerationResponse {
                    text: "Answer from context.".to_string(),
                    model: "test-model".to_string(),
                    usage: None,
                    finish_reason: Some("stop".to_string()),
                })
            });

        let response = mock
            .generate(vec![user_message("Hello")], GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, "Answer from context.");
    }

    #[test]
    fn test_message_creation() {
        let system_msg = system_message("You answer from context");
        assert_eq!(system_msg.role, Role::System);

        let user_msg = user_message("Hello");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello");
    }

    #[test]
    fn test_role_lowercase_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_api_url_generation() {
        let client = OpenAiChatClient::new(LlmConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.api_url("chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_completion_response_shape() {
        let json = r#"{
            "choices": [{"message": {"content": "hi", "role": "assistant"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content, "hi");
        assert_eq!(parsed.usage.as_ref().unwrap().total_tokens, 12);
    }
}
