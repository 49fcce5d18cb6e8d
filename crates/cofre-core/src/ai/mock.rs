//! Mock backend for testing
//!
//! Returns predictable classification responses without a network. By
//! default it answers with the first category id listed in the prompt;
//! tests can pin an exact response body or make every call fail.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{AIBackend, Completion, CompletionParams};

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Fixed response text; when None, a response is derived from the prompt
    canned: Option<String>,
    /// When true, every complete() call fails with a transport-style error
    failing: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            canned: None,
            failing: false,
        }
    }

    /// Mock that always returns exactly this text
    pub fn with_response(text: &str) -> Self {
        Self {
            healthy: true,
            canned: Some(text.to_string()),
            failing: false,
        }
    }

    /// Mock whose every call fails, for error-path tests
    pub fn failing() -> Self {
        Self {
            healthy: false,
            canned: None,
            failing: true,
        }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    /// Derive a plausible answer from the category list in the prompt
    fn derive_response(prompt: &str) -> String {
        let category_id = prompt
            .lines()
            .filter_map(|line| line.trim().strip_prefix("- ID: "))
            .filter_map(|rest| rest.split('|').next())
            .map(|id| id.trim().to_string())
            .next();

        match category_id {
            Some(id) => format!(
                r#"{{"category_id": "{}", "confidence": 0.9, "reasoning": "mock keyword match"}}"#,
                id
            ),
            None => {
                r#"{"category_id": null, "confidence": 0.2, "reasoning": "no catalog in prompt"}"#
                    .to_string()
            }
        }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<Completion> {
        if self.failing {
            return Err(Error::Classification(
                "mock transport failure".to_string(),
            ));
        }

        let text = self
            .canned
            .clone()
            .unwrap_or_else(|| Self::derive_response(prompt));

        Ok(Completion {
            prompt_tokens: (prompt.len() / 4) as u32,
            completion_tokens: (text.len() / 4) as u32,
            text,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }
}
