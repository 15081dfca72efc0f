//! Error types for generation calls

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Generation provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network, timeout or API-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The model answered with no text
    #[error("Empty response from model '{model}'")]
    EmptyResponse {
        /// Model that was called
        model: String,
    },

    /// Structured output requested but the text could not be recovered
    #[error("Invalid structured output: {0}")]
    InvalidStructuredOutput(String),

    /// Provider misconfiguration; never retried
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every attempt failed
    #[error("Generation failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// The final failure
        #[source]
        last_error: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_)
                | ProviderError::EmptyResponse { .. }
                | ProviderError::InvalidStructuredOutput(_)
        )
    }

    /// Whether the model answered but its text could not be used as structured data
    pub fn is_invalid_output(&self) -> bool {
        match self {
            ProviderError::InvalidStructuredOutput(_) => true,
            ProviderError::RetriesExhausted { last_error, .. } => last_error.is_invalid_output(),
            _ => false,
        }
    }
}

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::InvalidArgument(msg) => ProviderError::Config(msg),
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, ProviderError>;
