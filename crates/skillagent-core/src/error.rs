//! Error types for the orchestration core

use skillagent_persistence::StorageError;
use skillagent_provider::ProviderError;
use skillagent_types::{ErrorKind, ResultEnvelope};
use thiserror::Error;
use tracing::error;

/// Message shown instead of internal details
const INTERNAL_ERROR_MESSAGE: &str = "Internal error, please try again later";

/// Orchestration errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// No registered skill serves the intent
    #[error("No skill found for intent '{intent}'")]
    NoSkillFound {
        /// Intent label(s) that were tried
        intent: String,
    },

    /// Caller input or artifact content is malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configured resource (prompt template, artifact) is missing
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Generation call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Generated output does not satisfy the skill's contract
    #[error("Parse error: {0}")]
    Parse(String),

    /// Storage backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable kind surfaced to callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::NoSkillFound { .. } => ErrorKind::NoSkillFound,
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            AgentError::Provider(_) => ErrorKind::Provider,
            AgentError::Parse(_) => ErrorKind::Parse,
            AgentError::Storage(StorageError::NotFound(_)) => ErrorKind::ResourceNotFound,
            AgentError::Storage(StorageError::VersionConflict { .. }) => ErrorKind::Conflict,
            AgentError::Storage(StorageError::InvalidKey(_)) => ErrorKind::Validation,
            AgentError::Storage(_) => ErrorKind::Storage,
            AgentError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Failure envelope for this error; internal details are only logged
    pub fn to_envelope(&self) -> ResultEnvelope {
        match self.kind() {
            ErrorKind::Internal => {
                error!("Internal error: {}", self);
                ResultEnvelope::failure(ErrorKind::Internal, INTERNAL_ERROR_MESSAGE)
            }
            kind => ResultEnvelope::failure(kind, self.to_string()),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            AgentError::NoSkillFound { intent: "dance".into() }.kind(),
            ErrorKind::NoSkillFound
        );
        assert_eq!(
            AgentError::from(StorageError::NotFound("a".into())).kind(),
            ErrorKind::ResourceNotFound
        );
        assert_eq!(
            AgentError::from(StorageError::VersionConflict {
                namespace: "sessions".into(),
                key: "s1".into(),
                expected: 1,
                actual: 2,
            })
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AgentError::from(StorageError::RemoteUnavailable("down".into())).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            AgentError::from(ProviderError::Transport("timeout".into())).kind(),
            ErrorKind::Provider
        );
    }

    #[test]
    fn test_internal_envelope_hides_details() {
        let envelope = AgentError::Internal("pool poisoned at 0xdead".into()).to_envelope();
        assert!(!envelope.success);
        assert_eq!(envelope.error, Some(ErrorKind::Internal));
        assert_eq!(envelope.message.as_deref(), Some(INTERNAL_ERROR_MESSAGE));
    }

    #[test]
    fn test_envelope_carries_message() {
        let envelope = AgentError::ResourceNotFound("prompts/quiz.txt".into()).to_envelope();
        assert_eq!(envelope.error, Some(ErrorKind::ResourceNotFound));
        assert!(envelope.message.unwrap().contains("prompts/quiz.txt"));
    }
}
