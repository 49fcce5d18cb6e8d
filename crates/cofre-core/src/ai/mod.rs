//! Pluggable AI backend abstraction for the classification fallback
//!
//! # Architecture
//!
//! - `AIBackend` trait: the minimal completion interface the classifier needs
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! The client is constructor-injected into the classifier (never a
//! module-level singleton) so tests run without network access and servers
//! can swap providers per tenant.
//!
//! # Configuration
//!
//! Environment variables read by `AIClient::from_env`:
//! - `AI_BACKEND`: Backend to use (openai, mock). Default: openai
//! - `AI_API_KEY`: API key (required for the openai backend)
//! - `AI_HOST`: Server URL (default: https://api.openai.com)
//! - `AI_MODEL`: Default model name (default: gpt-4o-mini)

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod prompts;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Default per-call timeout for model requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Named presets trading determinism for recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Higher temperature, short answers
    Aggressive,
    #[default]
    Balanced,
    /// Near-deterministic, room for longer reasoning
    Quality,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Balanced => "balanced",
            Self::Quality => "quality",
        }
    }

    /// The (temperature, max_tokens) pair this preset fixes
    pub fn params(&self, timeout: Duration) -> CompletionParams {
        let (temperature, max_tokens) = match self {
            Self::Aggressive => (0.5, 150),
            Self::Balanced => (0.3, 200),
            Self::Quality => (0.1, 300),
        };
        CompletionParams {
            temperature,
            max_tokens,
            timeout,
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggressive" => Ok(Self::Aggressive),
            "balanced" => Ok(Self::Balanced),
            "quality" => Ok(Self::Quality),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sampling parameters for one completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// A model completion with token accounting
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Trait defining the interface for AI backends.
///
/// Backends must be Send + Sync to allow use across batch workers.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Run one chat completion under the given sampling parameters
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging and pricing)
    fn model(&self) -> &str;
}

/// Concrete AI client enum.
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat-completions backend
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables.
    ///
    /// Returns None if the required credential is not set; callers surface
    /// that as a configuration error before any batch work starts.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai".to_string());

        match backend.to_lowercase().as_str() {
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            "openai" | "openai_compatible" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to openai");
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an OpenAI-compatible backend directly
    pub fn openai(host: &str, model: &str, api_key: Option<&str>) -> Self {
        AIClient::OpenAICompatible(OpenAICompatibleBackend::new(host, model, api_key))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

#[async_trait]
impl AIBackend for AIClient {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(prompt, params).await,
            AIClient::Mock(b) => b.complete(prompt, params).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }
}
