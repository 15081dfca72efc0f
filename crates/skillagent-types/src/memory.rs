use crate::intent::MasteryLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Number of recent intent labels kept per session
pub const RECENT_INTENT_WINDOW: usize = 10;

// ============================================================================
// User Learning Profile
// ============================================================================

/// Aggregate counters and visited topics for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningHistory {
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub topics_visited: Vec<String>,
}

impl LearningHistory {
    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Record a topic, keeping first-visit order without duplicates
    pub fn visit(&mut self, topic: &str) {
        if !self.topics_visited.iter().any(|t| t == topic) {
            self.topics_visited.push(topic.to_string());
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Long-lived learning profile keyed by user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLearningProfile {
    pub user_id: String,
    #[serde(default)]
    pub mastery: BTreeMap<String, MasteryLevel>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub history: LearningHistory,
    pub updated_at: DateTime<Utc>,
    /// Store version this copy was read at; 0 when never persisted
    #[serde(skip)]
    pub version: u64,
}

impl UserLearningProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            mastery: BTreeMap::new(),
            preferences: BTreeMap::new(),
            history: LearningHistory::default(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    pub fn mastery_for(&self, topic: &str) -> Option<MasteryLevel> {
        self.mastery.get(topic).copied()
    }
}

// ============================================================================
// Artifact Records
// ============================================================================

/// Where an artifact's content lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Inline,
    Local,
    Remote,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::Inline => "inline",
            StorageType::Local => "local",
            StorageType::Remote => "remote",
        };
        f.write_str(s)
    }
}

/// Artifact body: either inline content or a reference to an offloaded copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage_type", rename_all = "lowercase")]
pub enum ArtifactContent {
    Inline { content: Value },
    Local { content_reference: String },
    Remote { content_reference: String },
}

impl ArtifactContent {
    pub fn storage_type(&self) -> StorageType {
        match self {
            ArtifactContent::Inline { .. } => StorageType::Inline,
            ArtifactContent::Local { .. } => StorageType::Local,
            ArtifactContent::Remote { .. } => StorageType::Remote,
        }
    }

    pub fn inline(&self) -> Option<&Value> {
        match self {
            ArtifactContent::Inline { content } => Some(content),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            ArtifactContent::Inline { .. } => None,
            ArtifactContent::Local { content_reference }
            | ArtifactContent::Remote { content_reference } => Some(content_reference),
        }
    }
}

/// One entry in a session's artifact history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: String,
    pub turn_number: u32,
    pub timestamp: DateTime<Utc>,
    pub artifact_type: String,
    pub topic: Option<String>,
    pub summary: String,
    #[serde(flatten)]
    pub body: ArtifactContent,
}

impl ArtifactRecord {
    pub fn storage_type(&self) -> StorageType {
        self.body.storage_type()
    }

    pub fn has_external_storage(&self) -> bool {
        self.storage_type() != StorageType::Inline
    }
}

// ============================================================================
// Session Context
// ============================================================================

/// Short-lived conversational state keyed by session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub current_topic: Option<String>,
    #[serde(default)]
    pub recent_intents: VecDeque<String>,
    #[serde(default)]
    pub artifact_history: Vec<ArtifactRecord>,
    #[serde(default)]
    pub last_user_message: String,
    pub updated_at: DateTime<Utc>,
    /// Store version this copy was read at; 0 when never persisted
    #[serde(skip)]
    pub version: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_topic: None,
            recent_intents: VecDeque::new(),
            artifact_history: Vec::new(),
            last_user_message: String::new(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    /// Push an intent label, evicting the oldest beyond the window
    pub fn push_intent(&mut self, intent: impl Into<String>) {
        self.recent_intents.push_back(intent.into());
        while self.recent_intents.len() > RECENT_INTENT_WINDOW {
            self.recent_intents.pop_front();
        }
    }

    pub fn next_turn_number(&self) -> u32 {
        self.artifact_history
            .last()
            .map_or(1, |record| record.turn_number + 1)
    }

    pub fn append_artifact(&mut self, record: ArtifactRecord) {
        self.artifact_history.push(record);
    }

    /// Most recent artifact; history is the single source of truth
    pub fn last_artifact(&self) -> Option<&ArtifactRecord> {
        self.artifact_history.last()
    }

    pub fn last_artifact_id(&self) -> Option<&str> {
        self.last_artifact().map(|r| r.artifact_id.as_str())
    }

    pub fn find_artifact(&self, artifact_id: &str) -> Option<&ArtifactRecord> {
        self.artifact_history
            .iter()
            .rev()
            .find(|r| r.artifact_id == artifact_id)
    }
}
