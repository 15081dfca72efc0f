use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Label used when a message cannot be mapped to any skill
pub const OTHER_INTENT: &str = "other";

/// Mastery level recorded per topic in a learning profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Weak,
    Medium,
    Strong,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryLevel::Weak => "weak",
            MasteryLevel::Medium => "medium",
            MasteryLevel::Strong => "strong",
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact snapshot of user/session state injected into the classifier prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub topic_hint: Option<String>,
    pub user_mastery_hint: Option<MasteryLevel>,
    #[serde(default)]
    pub recent_behavior: String,
}

/// One label or an ordered list of labels for a "mixed" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentLabel {
    Single(String),
    Multiple(Vec<String>),
}

impl IntentLabel {
    pub fn other() -> Self {
        IntentLabel::Single(OTHER_INTENT.to_string())
    }

    /// Labels in declaration order
    pub fn labels(&self) -> &[String] {
        match self {
            IntentLabel::Single(label) => std::slice::from_ref(label),
            IntentLabel::Multiple(labels) => labels,
        }
    }

    /// First declared label, used as the session's intent trail entry
    pub fn primary(&self) -> &str {
        self.labels().first().map_or(OTHER_INTENT, String::as_str)
    }

    pub fn is_other(&self) -> bool {
        self.labels().iter().all(|l| l == OTHER_INTENT)
    }
}

impl From<&str> for IntentLabel {
    fn from(label: &str) -> Self {
        IntentLabel::Single(label.to_string())
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels().join("+"))
    }
}

/// Structured outcome of classifying one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentLabel,
    pub topic: Option<String>,
    pub target_artifact: Option<String>,
    pub confidence: f64,
    pub raw_text: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl IntentResult {
    pub fn new(intent: impl Into<IntentLabel>, confidence: f64, raw_text: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            topic: None,
            target_artifact: None,
            confidence,
            raw_text: raw_text.into(),
            parameters: Map::new(),
        }
    }

    /// Deterministic result returned when the classifier output is unusable
    pub fn fallback(raw_text: impl Into<String>) -> Self {
        Self::new(IntentLabel::other(), 0.0, raw_text)
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_target_artifact(mut self, target: impl Into<String>) -> Self {
        self.target_artifact = Some(target.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_label_accepts_string_or_list() {
        let single: IntentLabel = serde_json::from_value(json!("quiz")).unwrap();
        assert_eq!(single.labels(), ["quiz".to_string()]);

        let mixed: IntentLabel = serde_json::from_value(json!(["explain", "quiz"])).unwrap();
        assert_eq!(mixed.primary(), "explain");
        assert_eq!(mixed.to_string(), "explain+quiz");
    }

    #[test]
    fn test_fallback_result() {
        let result = IntentResult::fallback("hello");
        assert!(result.intent.is_other());
        assert_eq!(result.confidence, 0.0);
        assert!(result.topic.is_none());
        assert!(result.target_artifact.is_none());
        assert_eq!(result.raw_text, "hello");
    }

    #[test]
    fn test_mastery_level_serde() {
        let level: MasteryLevel = serde_json::from_value(json!("weak")).unwrap();
        assert_eq!(level, MasteryLevel::Weak);
        assert_eq!(serde_json::to_value(MasteryLevel::Strong).unwrap(), json!("strong"));
    }
}
