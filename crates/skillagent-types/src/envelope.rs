use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable failure kinds callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoSkillFound,
    #[serde(rename = "validation_error")]
    Validation,
    ResourceNotFound,
    #[serde(rename = "provider_error")]
    Provider,
    #[serde(rename = "parse_error")]
    Parse,
    #[serde(rename = "storage_error")]
    Storage,
    Conflict,
    #[serde(rename = "internal_error")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoSkillFound => "no_skill_found",
            ErrorKind::Validation => "validation_error",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::Storage => "storage_error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform wrapper returned for every skill execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResultEnvelope {
    pub fn success(skill_id: impl Into<String>, skill_name: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            skill_id: Some(skill_id.into()),
            skill_name: Some(skill_name.into()),
            result: Some(result),
            artifact_id: None,
            error: None,
            message: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            skill_id: None,
            skill_name: None,
            result: None,
            artifact_id: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn with_artifact_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_envelope_shape() {
        let envelope = ResultEnvelope::failure(ErrorKind::NoSkillFound, "no skill for 'dance'");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "no_skill_found");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_success_envelope_shape() {
        let envelope = ResultEnvelope::success("quiz", "Quiz Generator", json!({"questions": []}))
            .with_artifact_id("artifact_quiz_set_x");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["skill_id"], "quiz");
        assert_eq!(value["artifact_id"], "artifact_quiz_set_x");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_error_kind_strings_match_serde() {
        for kind in [
            ErrorKind::NoSkillFound,
            ErrorKind::Validation,
            ErrorKind::ResourceNotFound,
            ErrorKind::Provider,
            ErrorKind::Parse,
            ErrorKind::Storage,
            ErrorKind::Conflict,
            ErrorKind::Internal,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }
}
