//! Agent facade: validate → classify → dispatch
//!
//! The single entry point the gateway talks to. One message may classify
//! into several intents; each runs through the orchestrator in order and
//! produces its own envelope.

use crate::error::{AgentError, Result};
use crate::memory::MemoryManager;
use crate::orchestrator::SkillOrchestrator;
use crate::router::IntentRouter;
use serde::Serialize;
use serde_json::json;
use skillagent_persistence::key::MAX_KEY_LENGTH;
use skillagent_persistence::{validate_key, PlanConfig, PlanStep, SessionSummary};
use skillagent_provider::GenerateRequest;
use skillagent_types::{IntentResult, ResultEnvelope};
use std::sync::Arc;
use tracing::{info, warn};

/// Longest accepted message, in characters
pub const MAX_MESSAGE_CHARS: usize = 5000;
/// Longest accepted user id
pub const MAX_ID_CHARS: usize = 100;

/// Skill id reported for small-talk replies
pub const CONVERSATION_SKILL_ID: &str = "conversation";

const CONVERSATION_NAME: &str = "Conversation";
const MIXED_PLAN_ID: &str = "mixed_request";
const MIXED_PLAN_NAME: &str = "Mixed request";
const CONVERSATION_MAX_TOKENS: u32 = 300;
const CONVERSATION_TEMPERATURE: f32 = 0.7;
const CONVERSATION_FALLBACK: &str =
    "I can help you practice with quizzes, explain concepts, or make flashcards. What would you like to study?";

/// Outcome of one message
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub user_id: String,
    pub session_id: String,
    pub intents: Vec<IntentResult>,
    pub results: Vec<ResultEnvelope>,
}

/// Public view of one registered skill
#[derive(Debug, Clone, Serialize)]
pub struct SkillInfo {
    pub id: String,
    pub display_name: String,
    pub intent_tags: Vec<String>,
    pub version: String,
}

/// What the agent can currently do
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub total_skills: usize,
    pub available_intents: Vec<String>,
    pub skills: Vec<SkillInfo>,
    pub overview: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub load_errors: Vec<String>,
}

/// Learning agent
pub struct Agent {
    router: IntentRouter,
    orchestrator: SkillOrchestrator,
    conversation_model: String,
}

impl Agent {
    pub fn new(
        router: IntentRouter,
        orchestrator: SkillOrchestrator,
        conversation_model: impl Into<String>,
    ) -> Self {
        Self {
            router,
            orchestrator,
            conversation_model: conversation_model.into(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        self.orchestrator.memory()
    }

    pub fn orchestrator(&self) -> &SkillOrchestrator {
        &self.orchestrator
    }

    /// Handle one user message end to end
    ///
    /// Invalid input and classifier transport failures are errors; skill
    /// failures are reported per intent as failure envelopes.
    pub async fn handle_message(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<AgentResponse> {
        validate_id("user_id", user_id)?;
        validate_session_id(session_id)?;
        let message = validate_message(message)?;

        info!(user_id, session_id, "Handling message ({} chars)", message.chars().count());

        let summary = self
            .memory()
            .generate_memory_summary(user_id, session_id)
            .await?;
        let intents = self.router.parse(message, Some(&summary)).await?;

        let results = if intents.iter().all(|i| i.intent.is_other()) {
            vec![self.converse(message).await]
        } else {
            if intents.len() > 1 {
                self.record_plan(session_id, message, &intents).await;
            }
            let mut results = Vec::with_capacity(intents.len());
            for intent in &intents {
                let envelope = match self
                    .orchestrator
                    .execute(intent, user_id, session_id, None)
                    .await
                {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(intent = %intent.intent, "Skill execution failed: {}", e);
                        e.to_envelope()
                    }
                };
                results.push(envelope);
            }
            results
        };

        Ok(AgentResponse {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            intents,
            results,
        })
    }

    /// Keep the plan of a multi-intent request next to the session's artifacts
    async fn record_plan(&self, session_id: &str, message: &str, intents: &[IntentResult]) {
        let mut steps = Vec::new();
        for (i, intent) in intents.iter().enumerate() {
            if let Some(skill) = self.orchestrator.select_skill(intent).await {
                steps.push(PlanStep {
                    step_id: format!("step_{}", i + 1),
                    skill_id: skill.id,
                    name: skill.display_name,
                });
            }
        }

        let plan = PlanConfig {
            skill_id: MIXED_PLAN_ID.to_string(),
            display_name: MIXED_PLAN_NAME.to_string(),
            steps,
        };
        let labels: Vec<String> = intents.iter().map(|i| i.intent.to_string()).collect();
        let user_input = json!({ "message": message, "intents": labels });

        if let Err(e) = self
            .memory()
            .artifact_store()
            .save_plan_metadata(session_id, plan, user_input)
            .await
        {
            warn!(session_id, "Failed to record plan: {}", e);
        }
    }

    /// Free-form reply for messages no skill should handle
    async fn converse(&self, message: &str) -> ResultEnvelope {
        let request = GenerateRequest::new(
            format!(
                "You are a friendly study assistant. Reply briefly to the learner.\n\nLearner: {}",
                message
            ),
            &self.conversation_model,
        )
        .with_max_tokens(CONVERSATION_MAX_TOKENS)
        .with_temperature(CONVERSATION_TEMPERATURE);

        let text = match self.orchestrator.provider().generate(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Conversation reply failed, using canned reply: {}", e);
                CONVERSATION_FALLBACK.to_string()
            }
        };

        ResultEnvelope::success(CONVERSATION_SKILL_ID, CONVERSATION_NAME, json!({ "text": text }))
    }

    /// Registered skills and the intents they serve
    pub async fn info(&self) -> AgentInfo {
        let registry = self.orchestrator.registry().read().await;

        let skills = registry
            .list_all_skills()
            .iter()
            .map(|skill| SkillInfo {
                id: skill.id.clone(),
                display_name: skill.display_name.clone(),
                intent_tags: skill.intent_tags.clone(),
                version: skill.version.clone(),
            })
            .collect::<Vec<_>>();

        AgentInfo {
            total_skills: skills.len(),
            available_intents: registry
                .get_all_intents()
                .into_iter()
                .map(str::to_string)
                .collect(),
            skills,
            overview: registry.skills_overview(),
            load_errors: registry
                .load_errors()
                .iter()
                .map(|e| format!("{}: {}", e.path.display(), e.message))
                .collect(),
        }
    }

    /// Re-read skill definitions from disk; returns the new skill count
    pub async fn reload_skills(&self) -> usize {
        let mut registry = self.orchestrator.registry().write().await;
        registry.reload();
        info!("Reloaded {} skills", registry.len());
        registry.len()
    }

    /// Sessions with a recorded plan
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.memory().artifact_store().list_sessions().await?)
    }

    /// Drop every stored artifact of a session; unknown sessions are a no-op
    pub async fn cleanup_session(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        Ok(self
            .memory()
            .artifact_store()
            .cleanup_session(session_id)
            .await?)
    }
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_ID_CHARS {
        return Err(AgentError::Validation(format!(
            "{} must be 1-{} characters",
            field, MAX_ID_CHARS
        )));
    }
    Ok(())
}

/// Session ids name storage directories and object key prefixes
fn validate_session_id(session_id: &str) -> Result<()> {
    validate_key(session_id).map_err(|_| {
        AgentError::Validation(format!(
            "session_id must be 1-{} bytes without path separators",
            MAX_KEY_LENGTH
        ))
    })
}

fn validate_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_MESSAGE_CHARS {
        return Err(AgentError::Validation(format!(
            "message must be 1-{} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(trimmed)
}
