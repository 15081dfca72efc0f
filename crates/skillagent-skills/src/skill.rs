//! Skill definition and parsing
//!
//! Each skill is a single YAML file describing the generation contract

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::{Result, SkillError};

/// Maximum allowed display name length
const MAX_DISPLAY_NAME_LENGTH: usize = 128;

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_composable() -> bool {
    true
}

/// Primary and optional fallback model identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Model used for every first call
    pub primary: String,
    /// Model tried only after the primary exhausts its retries
    #[serde(default)]
    pub fallback: Option<String>,
}

/// What a skill needs assembled before it runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequirements {
    /// Include the user profile and memory summary in the execution context
    #[serde(default)]
    pub need_user_memory: bool,
    /// Include the content store (reserved for retrieval-backed skills)
    #[serde(default)]
    pub need_content_store: bool,
    /// Retrieval depth for content store lookups
    #[serde(default)]
    pub retrieve_top_k: Option<u32>,
}

/// Cost classification used for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostProfile {
    /// Rough model size class, e.g. "small"
    #[serde(default)]
    pub model_class: Option<String>,
    /// Rough prompt size class
    #[serde(default)]
    pub context_size: Option<String>,
    /// Expected provider round trips per execution
    #[serde(default)]
    pub expected_rounds: Option<u32>,
}

/// Declarative capability descriptor loaded from a skill file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// Unique id, lowercase letters, digits, `_` and `-`
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Definition version
    #[serde(default = "default_version")]
    pub version: String,
    /// Intent labels this skill serves
    pub intent_tags: Vec<String>,
    /// JSON schema of accepted parameters
    pub input_schema: Map<String, Value>,
    /// JSON schema of the produced result
    pub output_schema: Map<String, Value>,
    /// Model selection
    pub models: ModelSelection,
    /// Context requirements
    #[serde(default)]
    pub context: ContextRequirements,
    /// Cost classification
    #[serde(default)]
    pub cost: CostProfile,
    /// Whether the skill can be chained with others
    #[serde(default = "default_composable")]
    pub composable: bool,
    /// Ids of skills this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Prompt template file, relative to the prompts directory
    #[serde(default)]
    pub prompt_file: Option<String>,
}

impl SkillDefinition {
    /// Load and validate a skill file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SkillError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_yaml_str(&content).map_err(|e| match e {
            SkillError::Parse { message, .. } => SkillError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate a skill from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let skill: SkillDefinition =
            serde_yaml::from_str(content).map_err(|e| SkillError::Parse {
                path: None,
                message: e.to_string(),
            })?;

        skill.validate()?;
        Ok(skill)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        let id_re = Regex::new(r"^[a-z0-9_-]+$")
            .map_err(|e| SkillError::Invalid(format!("Failed to compile id regex: {}", e)))?;

        if !id_re.is_match(&self.id) {
            return Err(SkillError::Invalid(format!(
                "Skill id '{}' must contain only lowercase letters, numbers, '_' and '-'",
                self.id
            )));
        }

        if self.display_name.trim().is_empty() {
            return Err(SkillError::Invalid(format!(
                "Skill '{}' has an empty display_name",
                self.id
            )));
        }

        if self.display_name.len() > MAX_DISPLAY_NAME_LENGTH {
            warn!(
                "Skill '{}' display_name exceeds {} characters",
                self.id, MAX_DISPLAY_NAME_LENGTH
            );
        }

        if self.intent_tags.is_empty() || self.intent_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(SkillError::Invalid(format!(
                "Skill '{}' must declare at least one non-empty intent tag",
                self.id
            )));
        }

        if self.models.primary.trim().is_empty() {
            return Err(SkillError::Invalid(format!(
                "Skill '{}' must declare models.primary",
                self.id
            )));
        }

        Ok(())
    }

    /// Whether this skill serves the given intent label
    pub fn serves(&self, intent: &str) -> bool {
        self.intent_tags.iter().any(|t| t == intent)
    }

    /// Keys the output schema lists under `required`
    pub fn required_output_fields(&self) -> Vec<&str> {
        self.output_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// One-line summary: "- {id} ({display_name}): intents [a, b]"
    pub fn to_summary(&self) -> String {
        format!(
            "- {} ({}): intents [{}]",
            self.id,
            self.display_name,
            self.intent_tags.join(", ")
        )
    }
}
