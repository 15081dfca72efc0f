//! Memory manager
//!
//! Owns the user learning profile and the session context, derives the
//! memory summary fed to the intent router, and decides per artifact
//! whether content stays inline in the session or goes to the artifact
//! store with only a reference kept.

use crate::error::{AgentError, Result};
use chrono::Utc;
use serde_json::{json, Value};
use skillagent_persistence::{
    validate_key, ArtifactLocation, ArtifactStore, StateStore, StorageError, StorageKind,
};
use skillagent_types::{
    ArtifactContent, ArtifactRecord, MemorySummary, SessionContext, UserLearningProfile,
    OTHER_INTENT,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Content serializing to fewer bytes than this stays inline
pub const INLINE_THRESHOLD_BYTES: usize = 500;

/// Largest accepted artifact
pub const MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

const PROFILES: &str = "profiles";
const SESSIONS: &str = "sessions";
const ARTIFACT_INDEX: &str = "artifact_index";

const NEW_USER: &str = "new user";
/// Byte budget per id segment; offloaded ids must fit a storage key
const MAX_SLUG_BYTES: usize = 24;
const BEHAVIOR_INTENTS: usize = 3;

/// Profile and session memory with artifact offloading
pub struct MemoryManager {
    state: Arc<dyn StateStore>,
    artifacts: Arc<ArtifactStore>,
}

impl MemoryManager {
    pub fn new(state: Arc<dyn StateStore>, artifacts: Arc<ArtifactStore>) -> Self {
        Self { state, artifacts }
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.artifacts
    }

    // ------------------------------------------------------------------
    // Profiles and sessions
    // ------------------------------------------------------------------

    /// Load a profile, creating an empty one on first access
    pub async fn get_user_profile(&self, user_id: &str) -> Result<UserLearningProfile> {
        match self.state.get(PROFILES, user_id).await? {
            Some(stored) => {
                let mut profile: UserLearningProfile =
                    serde_json::from_value(stored.value).map_err(StorageError::from)?;
                profile.version = stored.version;
                Ok(profile)
            }
            None => {
                debug!("Creating profile for user {}", user_id);
                Ok(UserLearningProfile::new(user_id))
            }
        }
    }

    /// Write a profile back; fails with a conflict if it changed since it was read
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        profile: &mut UserLearningProfile,
    ) -> Result<()> {
        profile.updated_at = Utc::now();
        let value = serde_json::to_value(&*profile).map_err(StorageError::from)?;
        profile.version = self
            .state
            .compare_and_swap(PROFILES, user_id, profile.version, value)
            .await?;
        Ok(())
    }

    /// Load a session, creating an empty one on first access
    pub async fn get_session_context(&self, session_id: &str) -> Result<SessionContext> {
        match self.state.get(SESSIONS, session_id).await? {
            Some(stored) => {
                let mut session: SessionContext =
                    serde_json::from_value(stored.value).map_err(StorageError::from)?;
                session.version = stored.version;
                Ok(session)
            }
            None => Ok(SessionContext::new(session_id)),
        }
    }

    /// Write a session back; fails with a conflict if it changed since it was read
    pub async fn update_session_context(
        &self,
        session_id: &str,
        session: &mut SessionContext,
    ) -> Result<()> {
        session.updated_at = Utc::now();
        let value = serde_json::to_value(&*session).map_err(StorageError::from)?;
        session.version = self
            .state
            .compare_and_swap(SESSIONS, session_id, session.version, value)
            .await?;
        Ok(())
    }

    /// Compact snapshot for the classifier prompt
    pub async fn generate_memory_summary(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<MemorySummary> {
        let profile = self.get_user_profile(user_id).await?;
        let session = self.get_session_context(session_id).await?;

        let topic_hint = session.current_topic.clone();
        let user_mastery_hint = topic_hint
            .as_deref()
            .and_then(|topic| profile.mastery_for(topic));

        Ok(MemorySummary {
            topic_hint,
            user_mastery_hint,
            recent_behavior: behavior_description(&profile, &session),
        })
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Record an artifact in the session, offloading large content
    pub async fn save_artifact(
        &self,
        session_id: &str,
        content: &Value,
        artifact_type: &str,
        topic: Option<&str>,
        user_id: &str,
    ) -> Result<ArtifactRecord> {
        self.record_artifact(session_id, content, artifact_type, topic, user_id, |_| {})
            .await
    }

    /// Record an artifact and apply `update` to the session in the same write
    ///
    /// Content is stored and indexed before the session is written. If the
    /// session write fails both are removed again, so a failed call leaves
    /// the session, the index and the artifact store as they were.
    pub async fn record_artifact<F>(
        &self,
        session_id: &str,
        content: &Value,
        artifact_type: &str,
        topic: Option<&str>,
        user_id: &str,
        update: F,
    ) -> Result<ArtifactRecord>
    where
        F: FnOnce(&mut SessionContext),
    {
        validate_key(session_id)?;
        let size = validate_content(content)?;
        let artifact_id = generate_artifact_id(artifact_type, topic);

        let mut session = self.get_session_context(session_id).await?;

        let (body, offloaded) = if size < INLINE_THRESHOLD_BYTES {
            info!("Artifact {} kept inline ({} bytes)", artifact_id, size);
            let body = ArtifactContent::Inline {
                content: content.clone(),
            };
            (body, None)
        } else {
            let metadata = json!({
                "artifact_id": artifact_id,
                "artifact_type": artifact_type,
                "topic": topic,
                "user_id": user_id,
            });
            let location = self
                .artifacts
                .save_step_result(session_id, &artifact_id, content, Some(metadata))
                .await?;
            info!(
                "Artifact {} offloaded to {:?} ({} bytes)",
                artifact_id, location.kind, size
            );
            let body = match location.kind {
                StorageKind::Local => ArtifactContent::Local {
                    content_reference: location.key.clone(),
                },
                StorageKind::Remote => ArtifactContent::Remote {
                    content_reference: location.key.clone(),
                },
            };
            (body, Some(location))
        };

        if let Err(e) = self
            .state
            .put(ARTIFACT_INDEX, &artifact_id, json!({ "session_id": session_id }))
            .await
        {
            self.discard(None, offloaded.as_ref()).await;
            return Err(e.into());
        }

        let record = ArtifactRecord {
            artifact_id: artifact_id.clone(),
            turn_number: session.next_turn_number(),
            timestamp: Utc::now(),
            artifact_type: artifact_type.to_string(),
            topic: topic.map(str::to_string),
            summary: summarize(content, artifact_type, topic),
            body,
        };

        update(&mut session);
        session.append_artifact(record.clone());

        if let Err(e) = self.update_session_context(session_id, &mut session).await {
            warn!(
                "Session {} not updated, dropping artifact {}: {}",
                session_id, artifact_id, e
            );
            self.discard(Some(&artifact_id), offloaded.as_ref()).await;
            return Err(e);
        }

        Ok(record)
    }

    /// Best-effort removal of an artifact that never made it into a session
    async fn discard(&self, artifact_id: Option<&str>, location: Option<&ArtifactLocation>) {
        if let Some(location) = location {
            if let Err(e) = self.artifacts.remove(location).await {
                warn!("Failed to remove orphaned artifact {}: {}", location.key, e);
            }
        }
        if let Some(artifact_id) = artifact_id {
            if let Err(e) = self.state.delete(ARTIFACT_INDEX, artifact_id).await {
                warn!("Failed to remove index entry {}: {}", artifact_id, e);
            }
        }
    }

    /// Resolve an artifact id to its content
    pub async fn get_artifact(&self, artifact_id: &str) -> Result<Value> {
        let index = self
            .state
            .get(ARTIFACT_INDEX, artifact_id)
            .await?
            .ok_or_else(|| AgentError::ResourceNotFound(format!("artifact {}", artifact_id)))?;

        let session_id = index
            .value
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AgentError::Internal(format!("corrupt artifact index for {}", artifact_id))
            })?;

        let session = self.get_session_context(session_id).await?;
        let record = session.find_artifact(artifact_id).ok_or_else(|| {
            AgentError::ResourceNotFound(format!(
                "artifact {} in session {}",
                artifact_id, session_id
            ))
        })?;

        let location = match &record.body {
            ArtifactContent::Inline { content } => return Ok(content.clone()),
            ArtifactContent::Local { content_reference } => ArtifactLocation {
                kind: StorageKind::Local,
                key: content_reference.clone(),
            },
            ArtifactContent::Remote { content_reference } => ArtifactLocation {
                kind: StorageKind::Remote,
                key: content_reference.clone(),
            },
        };

        Ok(self.artifacts.load(&location).await?)
    }
}

/// Check shape and size; returns the serialized size in bytes
fn validate_content(content: &Value) -> Result<usize> {
    if !content.is_object() {
        return Err(AgentError::Validation(
            "Invalid artifact content: expected a JSON object".to_string(),
        ));
    }

    let size = serde_json::to_vec(content)
        .map_err(|e| AgentError::Validation(format!("Invalid artifact content: {}", e)))?
        .len();

    if size > MAX_ARTIFACT_BYTES {
        return Err(AgentError::Validation(format!(
            "Invalid artifact content: {} bytes exceeds the {} byte limit",
            size, MAX_ARTIFACT_BYTES
        )));
    }

    Ok(size)
}

fn slug(text: &str, max_bytes: usize) -> String {
    let mut out = String::new();
    let mut pending_sep = false;

    for c in text.chars() {
        if !c.is_alphanumeric() {
            pending_sep = true;
            continue;
        }

        let sep = if pending_sep && !out.is_empty() { "-" } else { "" };
        let lower: String = c.to_lowercase().collect();
        if out.len() + sep.len() + lower.len() > max_bytes {
            break;
        }
        out.push_str(sep);
        out.push_str(&lower);
        pending_sep = false;
    }

    if out.is_empty() {
        "general".to_string()
    } else {
        out
    }
}

/// `artifact_{type}_{topic-slug}_{8 hex}`
pub fn generate_artifact_id(artifact_type: &str, topic: Option<&str>) -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "artifact_{}_{}_{}",
        slug(artifact_type, MAX_SLUG_BYTES),
        slug(topic.unwrap_or_default(), MAX_SLUG_BYTES),
        &unique[..8]
    )
}

/// Short human-readable description keyed off the content's shape
pub fn summarize(content: &Value, artifact_type: &str, topic: Option<&str>) -> String {
    let on_topic = topic.map(|t| format!(" on {}", t)).unwrap_or_default();

    if let Some(questions) = content.get("questions").and_then(Value::as_array) {
        return format!("{} questions{}", questions.len(), on_topic);
    }
    if let Some(cards) = content.get("cards").and_then(Value::as_array) {
        return format!("{} cards{}", cards.len(), on_topic);
    }
    if let Some(concept) = content
        .get("concept")
        .or_else(|| content.get("title"))
        .and_then(Value::as_str)
    {
        return format!("Explanation of {}", concept);
    }

    format!("{} artifact{}", artifact_type, on_topic)
}

fn intent_phrase(intent: &str) -> &str {
    match intent {
        "quiz" => "practice problems",
        "explain" => "concept explanations",
        "flashcard" => "flashcards",
        "notes" => "study notes",
        other => other,
    }
}

/// Recent-behavior text for the memory summary
pub fn behavior_description(profile: &UserLearningProfile, session: &SessionContext) -> String {
    let mut parts = Vec::new();

    let mut recent: Vec<&str> = Vec::new();
    for intent in session.recent_intents.iter().rev() {
        if intent != OTHER_INTENT && !recent.contains(&intent.as_str()) {
            recent.push(intent.as_str());
        }
        if recent.len() == BEHAVIOR_INTENTS {
            break;
        }
    }
    if !recent.is_empty() {
        let phrases: Vec<_> = recent.iter().map(|i| intent_phrase(i)).collect();
        parts.push(format!("recently worked on {}", phrases.join(", ")));
    }

    if let Some(preferred) = profile.preferences.get("preferred_artifact") {
        parts.push(format!("prefers {}", intent_phrase(preferred)));
    }

    let sessions = profile.history.total();
    if sessions > 0 {
        parts.push(format!("completed {} learning sessions", sessions));
    }

    if parts.is_empty() {
        NEW_USER.to_string()
    } else {
        parts.join("; ")
    }
}
