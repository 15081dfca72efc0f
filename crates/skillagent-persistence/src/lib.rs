//! SkillAgent Persistence
//!
//! - [`ArtifactStore`]: offloaded step results, local filesystem plus an
//!   optional remote object store with write fallback
//! - [`StateStore`]: versioned key-value state for profiles and sessions

pub mod artifact_store;
pub mod error;
pub mod key;
pub mod local;
pub mod remote;
pub mod state;

pub use artifact_store::{
    generate_session_id, ArtifactLocation, ArtifactReference, ArtifactStore, PlanConfig,
    PlanMetadata, PlanStep, SessionSummary, StorageKind, StoredArtifact,
};
pub use error::{Result, StorageError};
pub use key::validate_key;
pub use local::LocalBackend;
pub use remote::{HttpObjectStore, RemoteBackend};
pub use state::{InMemoryStateStore, SqliteStateStore, StateStore, Versioned};
