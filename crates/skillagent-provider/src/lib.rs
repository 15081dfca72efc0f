//! SkillAgent Provider - text generation behind a single trait
//!
//! The orchestration core only sees [`GenerationProvider`]. The bundled
//! implementation talks to OpenAI-compatible endpoints (OpenAI, Ollama).

pub mod error;
pub mod openai;
pub mod repair;
pub mod retry;

pub use error::{ProviderError, Result};
pub use openai::OpenAiProvider;
pub use repair::{parse_structured, RepairError};
pub use retry::RetryPolicy;

use async_trait::async_trait;

/// Default completion budget in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Shape the caller expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// JSON object or array; the provider validates it before returning
    Structured,
}

/// A single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,
    pub response_format: ResponseFormat,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            response_format: ResponseFormat::Text,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn structured(mut self) -> Self {
        self.response_format = ResponseFormat::Structured;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Black-box text generator
///
/// Implementations own their retry budget and must never report an empty
/// answer as success.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Generate text for one request
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Generate for several requests, one after another, preserving order
    async fn generate_batch(&self, requests: Vec<GenerateRequest>) -> Result<Vec<String>> {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        for (i, request) in requests.into_iter().enumerate() {
            tracing::debug!("Processing batch item {}/{}", i + 1, total);
            results.push(self.generate(request).await?);
        }
        Ok(results)
    }
}
