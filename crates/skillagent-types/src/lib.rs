//! SkillAgent Types - shared data model
//!
//! Intent classification results, per-user and per-session memory, artifact
//! records and the uniform result envelope returned by skill execution.

pub mod envelope;
pub mod intent;
pub mod memory;
pub mod provider;

pub use envelope::{ErrorKind, ResultEnvelope};
pub use intent::{IntentLabel, IntentResult, MasteryLevel, MemorySummary, OTHER_INTENT};
pub use memory::{
    ArtifactContent, ArtifactRecord, LearningHistory, SessionContext, StorageType,
    UserLearningProfile, RECENT_INTENT_WINDOW,
};
pub use provider::Provider;
