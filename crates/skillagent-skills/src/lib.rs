//! SkillAgent Skills System
//!
//! Declarative generation capabilities. Each skill is one YAML file naming
//! the intents it serves, its input/output schemas, the models to call,
//! what context it needs and an optional prompt template file.
//!
//! ## Loading
//!
//! The registry scans a single config directory at construction and on
//! `reload()`. Malformed files are skipped and recorded, never fatal.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod error;
pub mod registry;
pub mod skill;

pub use error::{Result, SkillError};
pub use registry::{LoadError, SkillRegistry};
pub use skill::{ContextRequirements, CostProfile, ModelSelection, SkillDefinition};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{SkillDefinition, SkillRegistry};
}
