//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! the hosted OpenAI endpoint, vLLM, LocalAI, llama-server, etc.
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_API_KEY`: API key (required)
//! - `AI_HOST`: Server URL (default: https://api.openai.com)
//! - `AI_MODEL`: Model name (default: gpt-4o-mini)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::prompts::SYSTEM_PROMPT;
use super::{AIBackend, Completion, CompletionParams};

/// OpenAI-compatible backend
///
/// Each call carries its own timeout; timeouts and transport failures
/// surface as `Error::Classification` and never unwind a batch.
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl Clone for OpenAICompatibleBackend {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|k| k.to_string()),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            api_key: self.api_key.clone(),
        }
    }

    /// Create from environment variables.
    ///
    /// Required: `AI_API_KEY`. Optional: `AI_HOST`, `AI_MODEL`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("AI_API_KEY").ok()?;
        let host =
            std::env::var("AI_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let model = std::env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self::new(&host, &model, Some(&api_key)))
    }
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(params.timeout)
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| Error::Classification(format!("model request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Classification(format!(
                "model API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Classification(format!("malformed model response: {}", e)))?;

        let usage = chat_response.usage.unwrap_or_default();
        let text = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Classification("no choices in model response".into()))?;

        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat completion finished"
        );

        Ok(Completion {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(std::time::Duration::from_secs(5));
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        matches!(req.send().await, Ok(resp) if resp.status().is_success())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Token usage block
#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Strategy, DEFAULT_REQUEST_TIMEOUT};
    use crate::test_utils::MockChatServer;

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let mut server = MockChatServer::start(
            r#"{"category_id": "cat-1", "confidence": 0.8, "reasoning": "test"}"#,
        )
        .await;

        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-4o-mini", Some("key"));
        let params = Strategy::Balanced.params(DEFAULT_REQUEST_TIMEOUT);
        let completion = backend.complete("classify this", &params).await.unwrap();

        assert!(completion.text.contains("cat-1"));
        assert!(completion.prompt_tokens > 0);
        assert!(completion.completion_tokens > 0);

        server.stop();
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_classification_error() {
        let mut server = MockChatServer::start_slow(
            r#"{"category_id": "cat-1", "confidence": 0.8, "reasoning": "late"}"#,
            std::time::Duration::from_secs(5),
        )
        .await;

        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-4o-mini", None);
        let params = CompletionParams {
            temperature: 0.3,
            max_tokens: 200,
            timeout: std::time::Duration::from_millis(250),
        };

        let result = backend.complete("classify this", &params).await;
        assert!(matches!(result, Err(Error::Classification(_))));

        server.stop();
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error_not_a_panic() {
        // Port 9 (discard) is unlikely to accept connections
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:9", "gpt-4o-mini", None);
        let params = CompletionParams {
            temperature: 0.3,
            max_tokens: 200,
            timeout: std::time::Duration::from_millis(500),
        };
        assert!(backend.complete("x", &params).await.is_err());
    }

    #[test]
    fn test_with_model_overrides() {
        let backend = OpenAICompatibleBackend::new("http://localhost:1234", "gpt-4o-mini", None);
        assert_eq!(backend.with_model("gpt-4o").model(), "gpt-4o");
        assert_eq!(backend.model(), "gpt-4o-mini");
    }
}
