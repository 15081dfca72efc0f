//! Artifact store: context offloading for generated step results
//!
//! A step result is written once under `{session}/step_{step}.json` and
//! passed around as a small [`ArtifactReference`] instead of its content.
//! Writes try the remote backend first and fall back to the local one;
//! the backend that took the write is recorded in the returned
//! [`ArtifactLocation`]. Reads never fall back.

use crate::error::{Result, StorageError};
use crate::key::{step_key, validate_key};
use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PLAN_METADATA_FILE: &str = "plan_metadata.json";
const REFERENCE_TYPE: &str = "artifact_reference";

/// Backend holding an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Remote,
}

/// Where a saved artifact ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub kind: StorageKind,
    /// Backend-relative key, `{session}/step_{step}.json`
    pub key: String,
}

/// On-disk / object-store record for one step result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub step_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: Value,
    #[serde(default)]
    pub metadata: Value,
}

/// Lightweight pointer to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    #[serde(rename = "type")]
    pub reference_type: String,
    pub session_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    pub location: StorageKind,
}

/// One step of an execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_id: String,
    pub skill_id: String,
    pub name: String,
}

/// Plan configuration persisted alongside a session's artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub skill_id: String,
    pub display_name: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// `plan_metadata.json` contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub plan_config: PlanConfig,
    pub user_input: Value,
}

/// Entry returned by [`ArtifactStore::list_sessions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub step_count: usize,
    pub plan_name: String,
}

/// Per-write backend selection
enum WriteState {
    TryRemote,
    Fallback(String),
    TryLocal,
}

/// Artifact store with optional remote backend and local fallback
pub struct ArtifactStore {
    local: LocalBackend,
    remote: Option<Arc<dyn RemoteBackend>>,
}

impl ArtifactStore {
    /// Local-only store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let local = LocalBackend::new(base_dir);
        info!("ArtifactStore initialized: {:?}", local.base_dir());
        Self {
            local,
            remote: None,
        }
    }

    /// Prefer `remote` for writes, falling back to the local directory
    pub fn with_remote(mut self, remote: Arc<dyn RemoteBackend>) -> Self {
        info!("ArtifactStore remote backend: {}", remote.name());
        self.remote = Some(remote);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Persist a step result and report which backend took it
    pub async fn save_step_result(
        &self,
        session_id: &str,
        step_id: &str,
        result: &Value,
        metadata: Option<Value>,
    ) -> Result<ArtifactLocation> {
        let key = step_key(session_id, step_id)?;

        let artifact = StoredArtifact {
            step_id: step_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            result: result.clone(),
            metadata: metadata.unwrap_or_else(|| Value::Object(Map::new())),
        };
        let body = serde_json::to_vec_pretty(&artifact)?;

        let mut state = match self.remote {
            Some(_) => WriteState::TryRemote,
            None => WriteState::TryLocal,
        };

        loop {
            state = match state {
                WriteState::TryRemote => match self.try_remote_put(&key, &body).await {
                    Ok(()) => {
                        info!("Saved artifact {} to remote ({} bytes)", key, body.len());
                        return Ok(ArtifactLocation {
                            kind: StorageKind::Remote,
                            key,
                        });
                    }
                    Err(reason) => WriteState::Fallback(reason),
                },
                WriteState::Fallback(reason) => {
                    warn!("Remote write of {} failed, falling back to local: {}", key, reason);
                    WriteState::TryLocal
                }
                WriteState::TryLocal => {
                    if let Err(e) = self.local.put(&key, &body).await {
                        error!("Failed to save artifact {}: {}", key, e);
                        return Err(e);
                    }
                    info!("Saved artifact {} to local ({} bytes)", key, body.len());
                    return Ok(ArtifactLocation {
                        kind: StorageKind::Local,
                        key,
                    });
                }
            };
        }
    }

    async fn try_remote_put(&self, key: &str, body: &[u8]) -> std::result::Result<(), String> {
        let Some(remote) = &self.remote else {
            return Err("no remote backend configured".to_string());
        };
        if !remote.is_available().await {
            return Err(format!("{} is unreachable", remote.name()));
        }
        remote
            .put(key, body.to_vec())
            .await
            .map_err(|e| e.to_string())
    }

    /// Load a result from the local backend
    pub async fn load_step_result(&self, session_id: &str, step_id: &str) -> Result<Value> {
        let location = ArtifactLocation {
            kind: StorageKind::Local,
            key: step_key(session_id, step_id)?,
        };
        self.load(&location).await
    }

    /// Load a result from whichever backend the location names
    pub async fn load(&self, location: &ArtifactLocation) -> Result<Value> {
        let bytes = match location.kind {
            StorageKind::Local => self.local.get(&location.key).await?,
            StorageKind::Remote => {
                let remote = self.remote.as_ref().ok_or_else(|| {
                    StorageError::RemoteUnavailable(format!(
                        "no remote backend configured for {}",
                        location.key
                    ))
                })?;
                remote.get(&location.key).await.map_err(|e| match e {
                    StorageError::Http(e) => StorageError::RemoteUnavailable(e.to_string()),
                    other => other,
                })?
            }
        };

        let artifact: StoredArtifact = serde_json::from_slice(&bytes)?;
        debug!("Loaded artifact {} ({} bytes)", location.key, bytes.len());
        Ok(artifact.result)
    }

    /// Delete the object at a location; a missing object is not an error
    pub async fn remove(&self, location: &ArtifactLocation) -> Result<()> {
        match location.kind {
            StorageKind::Local => {
                self.local.remove(&location.key).await?;
            }
            StorageKind::Remote => {
                let remote = self.remote.as_ref().ok_or_else(|| {
                    StorageError::RemoteUnavailable(format!(
                        "no remote backend configured for {}",
                        location.key
                    ))
                })?;
                remote.delete_prefix(&location.key).await?;
            }
        }
        debug!("Removed artifact {}", location.key);
        Ok(())
    }

    /// Small pointer to a stored step, optionally restricted to some fields
    pub fn create_reference(
        &self,
        session_id: &str,
        step_id: &str,
        fields: Option<Vec<String>>,
        location: StorageKind,
    ) -> ArtifactReference {
        ArtifactReference {
            reference_type: REFERENCE_TYPE.to_string(),
            session_id: session_id.to_string(),
            step_id: step_id.to_string(),
            fields,
            location,
        }
    }

    /// Resolve a reference, keeping only the listed fields when present
    pub async fn load_reference(&self, reference: &ArtifactReference) -> Result<Value> {
        let location = ArtifactLocation {
            kind: reference.location,
            key: step_key(&reference.session_id, &reference.step_id)?,
        };
        let result = self.load(&location).await?;

        match (&reference.fields, result) {
            (Some(fields), Value::Object(map)) => {
                let filtered: Map<String, Value> = map
                    .into_iter()
                    .filter(|(k, _)| fields.iter().any(|f| f == k))
                    .collect();
                Ok(Value::Object(filtered))
            }
            (_, result) => Ok(result),
        }
    }

    /// Persist the plan and caller input of a multi-step run
    pub async fn save_plan_metadata(
        &self,
        session_id: &str,
        plan_config: PlanConfig,
        user_input: Value,
    ) -> Result<String> {
        validate_key(session_id)?;
        let key = format!("{}/{}", session_id, PLAN_METADATA_FILE);

        let metadata = PlanMetadata {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            plan_config,
            user_input,
        };
        self.local
            .put(&key, &serde_json::to_vec_pretty(&metadata)?)
            .await?;

        info!("Saved plan metadata: {}", key);
        Ok(key)
    }

    pub async fn load_plan_metadata(&self, session_id: &str) -> Result<PlanMetadata> {
        validate_key(session_id)?;
        let key = format!("{}/{}", session_id, PLAN_METADATA_FILE);
        let bytes = self.local.get(&key).await.map_err(|e| match e {
            StorageError::NotFound(_) => {
                StorageError::NotFound(format!("plan metadata for {}", session_id))
            }
            other => other,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove every artifact of a session; unknown sessions are a no-op
    pub async fn cleanup_session(&self, session_id: &str) -> Result<()> {
        validate_key(session_id)?;

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete_prefix(&format!("{}/", session_id)).await {
                warn!("Failed to clean remote artifacts for {}: {}", session_id, e);
            }
        }

        if self.local.remove_dir(session_id).await? {
            info!("Cleaned up session: {}", session_id);
        } else {
            warn!("Session dir not found: {}", session_id);
        }
        Ok(())
    }

    /// Sessions with readable plan metadata; others are skipped
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();

        for session_id in self.local.list_dirs().await? {
            let metadata = match self.load_plan_metadata(&session_id).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Failed to load session {}: {}", session_id, e);
                    continue;
                }
            };

            let step_count = match self.local.count_files(&session_id, "step_").await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Failed to count steps for {}: {}", session_id, e);
                    continue;
                }
            };

            sessions.push(SessionSummary {
                session_id,
                timestamp: metadata.timestamp,
                step_count,
                plan_name: metadata.plan_config.display_name,
            });
        }

        Ok(sessions)
    }
}

/// Unique session id: `plan_{unix_ts}_{8 hex}`
pub fn generate_session_id() -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("plan_{}_{}", Utc::now().timestamp(), &unique[..8])
}
