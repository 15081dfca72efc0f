//! Error types for skill loading

use std::path::PathBuf;
use thiserror::Error;

/// Skill loading and validation errors
#[derive(Debug, Error)]
pub enum SkillError {
    /// Skill file could not be read
    #[error("Failed to read {path:?}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Skill file is not a valid definition
    #[error("Failed to parse skill: {message}")]
    Parse {
        /// File that failed, when known
        path: Option<PathBuf>,
        /// Parser message
        message: String,
    },

    /// Definition parsed but breaks a rule
    #[error("Invalid skill: {0}")]
    Invalid(String),

    /// Two files declare the same id
    #[error("Duplicate skill id '{id}' in {path:?}")]
    Duplicate {
        /// Conflicting id
        id: String,
        /// File that was rejected
        path: PathBuf,
    },
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, SkillError>;
