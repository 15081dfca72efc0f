//! Skill orchestrator
//!
//! One execution runs strictly in sequence:
//! select skill → assemble context → build parameters → render prompt →
//! generate and validate (primary model, then fallback) → write back to memory.
//!
//! Output that breaks the skill's contract is retried with backoff on the
//! same model before the fallback is tried. Transport retries stay inside
//! the provider.

use crate::error::{AgentError, Result};
use crate::memory::MemoryManager;
use serde::Serialize;
use serde_json::{Map, Value};
use skillagent_persistence::validate_key;
use skillagent_provider::retry::retry_with_backoff;
use skillagent_provider::{
    parse_structured, GenerateRequest, GenerationProvider, ProviderError, RetryPolicy,
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use skillagent_skills::{SkillDefinition, SkillRegistry};
use skillagent_types::{
    IntentResult, MemorySummary, ResultEnvelope, SessionContext, UserLearningProfile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const PARAMS_PLACEHOLDER: &str = "{params}";
const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Generation parameters applied to every skill call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Session state a skill prompt may see
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub current_topic: Option<String>,
    pub recent_intents: Vec<String>,
    pub last_artifact_summary: Option<String>,
}

impl From<&SessionContext> for SessionSnapshot {
    fn from(session: &SessionContext) -> Self {
        Self {
            current_topic: session.current_topic.clone(),
            recent_intents: session.recent_intents.iter().cloned().collect(),
            last_artifact_summary: session.last_artifact().map(|r| r.summary.clone()),
        }
    }
}

/// Context handed to a skill; absent fields are omitted, not null
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserLearningProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_context: Option<SessionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_summary: Option<MemorySummary>,
}

impl ExecutionContext {
    pub fn is_empty(&self) -> bool {
        self.user_profile.is_none() && self.session_context.is_none() && self.memory_summary.is_none()
    }
}

/// Dispatches classified intents to skills
pub struct SkillOrchestrator {
    registry: Arc<RwLock<SkillRegistry>>,
    provider: Arc<dyn GenerationProvider>,
    memory: Arc<MemoryManager>,
    prompts_dir: PathBuf,
    settings: GenerationSettings,
    retry_policy: RetryPolicy,
}

impl SkillOrchestrator {
    pub fn new(
        registry: Arc<RwLock<SkillRegistry>>,
        provider: Arc<dyn GenerationProvider>,
        memory: Arc<MemoryManager>,
        prompts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            provider,
            memory,
            prompts_dir: prompts_dir.into(),
            settings: GenerationSettings::default(),
            retry_policy: RetryPolicy::default().with_max_attempts(DEFAULT_MAX_RETRIES),
        }
    }

    /// Also sets the attempt budget for output that breaks the skill's contract
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.retry_policy = self.retry_policy.with_max_attempts(settings.max_retries);
        self.settings = settings;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn registry(&self) -> &Arc<RwLock<SkillRegistry>> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// First skill serving the first matching label, in declaration order
    pub async fn select_skill(&self, intent: &IntentResult) -> Option<SkillDefinition> {
        let registry = self.registry.read().await;
        intent
            .intent
            .labels()
            .iter()
            .find_map(|label| registry.get_skills_by_intent(label).first().map(|s| (*s).clone()))
    }

    /// Profile, session and summary when the skill asks for user memory
    pub async fn assemble_context(
        &self,
        skill: &SkillDefinition,
        user_id: &str,
        session_id: &str,
    ) -> Result<ExecutionContext> {
        if !skill.context.need_user_memory {
            return Ok(ExecutionContext::default());
        }

        let profile = self.memory.get_user_profile(user_id).await?;
        let session = self.memory.get_session_context(session_id).await?;
        let summary = self
            .memory
            .generate_memory_summary(user_id, session_id)
            .await?;

        Ok(ExecutionContext {
            user_profile: Some(profile),
            session_context: Some(SessionSnapshot::from(&session)),
            memory_summary: Some(summary),
        })
    }

    /// Read the skill's prompt template from the prompts directory
    pub async fn load_prompt(&self, skill: &SkillDefinition) -> Result<String> {
        let file = skill.prompt_file.as_deref().ok_or_else(|| {
            AgentError::ResourceNotFound(format!("skill '{}' declares no prompt_file", skill.id))
        })?;
        let path = self.prompts_dir.join(file);

        match tokio::fs::read_to_string(&path).await {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                AgentError::ResourceNotFound(format!("prompt template {}", path.display())),
            ),
            Err(e) => Err(AgentError::Internal(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Execute one classified intent and return its envelope
    ///
    /// `no_skill_found` comes back as a failure envelope; every other
    /// failure is an error so the caller decides how to surface it.
    pub async fn execute(
        &self,
        intent: &IntentResult,
        user_id: &str,
        session_id: &str,
        additional_params: Option<&Map<String, Value>>,
    ) -> Result<ResultEnvelope> {
        validate_key(session_id)?;

        let Some(skill) = self.select_skill(intent).await else {
            warn!("No skill found for intent '{}'", intent.intent);
            return Ok(AgentError::NoSkillFound {
                intent: intent.intent.to_string(),
            }
            .to_envelope());
        };

        info!(skill_id = %skill.id, session_id, "Executing skill for intent '{}'", intent.intent);

        let context = self.assemble_context(&skill, user_id, session_id).await?;
        let params = build_params(intent, context.memory_summary.as_ref(), additional_params);
        let template = self.load_prompt(&skill).await?;
        let prompt = format_prompt(&template, &params, &context)?;

        let result = self.generate(&skill, &prompt).await?;

        let artifact_id = self
            .write_back(intent, &skill, user_id, session_id, &result)
            .await?;

        info!(skill_id = %skill.id, artifact_id = %artifact_id, "Skill execution completed");

        Ok(ResultEnvelope::success(&skill.id, &skill.display_name, result).with_artifact_id(artifact_id))
    }

    /// Primary model first; the fallback model only after the primary fails
    async fn generate(&self, skill: &SkillDefinition, prompt: &str) -> Result<Value> {
        match self.generate_with(skill, prompt, &skill.models.primary).await {
            Ok(value) => Ok(value),
            Err(e) => match &skill.models.fallback {
                Some(fallback) => {
                    warn!(
                        skill_id = %skill.id,
                        "Primary model {} failed ({}), trying fallback {}",
                        skill.models.primary, e, fallback
                    );
                    self.generate_with(skill, prompt, fallback).await
                }
                None => Err(e),
            },
        }
    }

    /// Generate on one model until the output satisfies the skill's contract
    async fn generate_with(&self, skill: &SkillDefinition, prompt: &str, model: &str) -> Result<Value> {
        let label = format!("skill {} on {}", skill.id, model);

        let outcome = retry_with_backoff(&self.retry_policy, &label, move |attempt| async move {
            if attempt > 0 {
                debug!("Regenerating {} (attempt {})", skill.id, attempt + 1);
            }

            let request = GenerateRequest::new(prompt, model)
                .structured()
                .with_max_tokens(self.settings.max_tokens)
                .with_temperature(self.settings.temperature)
                .with_max_retries(self.settings.max_retries);

            // Only contract failures are retried here
            match self.provider.generate(request).await {
                Ok(text) => contract_output(skill, &text).map(Ok),
                Err(e) if e.is_invalid_output() => Ok(Err(AgentError::Parse(e.to_string()))),
                Err(e) => Ok(Err(AgentError::Provider(e))),
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(ProviderError::RetriesExhausted { attempts, last_error }) => Err(AgentError::Parse(
                format!("{} (after {} attempts)", last_error, attempts),
            )),
            Err(e) => Err(AgentError::Parse(e.to_string())),
        }
    }

    /// Record the artifact and the session changes in one write, then the profile
    async fn write_back(
        &self,
        intent: &IntentResult,
        skill: &SkillDefinition,
        user_id: &str,
        session_id: &str,
        result: &Value,
    ) -> Result<String> {
        let topic = intent.topic.as_deref();
        let artifact_type = intent.target_artifact.as_deref().unwrap_or(&skill.id);

        let record = self
            .memory
            .record_artifact(session_id, result, artifact_type, topic, user_id, |session| {
                if let Some(topic) = topic {
                    session.current_topic = Some(topic.to_string());
                }
                session.push_intent(intent.intent.primary());
                session.last_user_message = intent.raw_text.clone();
            })
            .await?;

        let mut profile = self.memory.get_user_profile(user_id).await?;
        profile
            .history
            .increment(&format!("{}_sessions", intent.intent.primary()));
        if let Some(topic) = topic {
            profile.history.visit(topic);
        }
        self.memory.update_user_profile(user_id, &mut profile).await?;

        debug!(
            "Recorded turn {} ({}) for session {}",
            record.turn_number, record.summary, session_id
        );
        Ok(record.artifact_id)
    }
}

/// Topic and memory text, then intent parameters, then caller parameters;
/// later sources win on collision
pub fn build_params(
    intent: &IntentResult,
    summary: Option<&MemorySummary>,
    additional: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut params = Map::new();

    if let Some(topic) = &intent.topic {
        params.insert("topic".to_string(), Value::String(topic.clone()));
    }
    if let Some(summary) = summary {
        params.insert(
            "memory_summary".to_string(),
            Value::String(summary.recent_behavior.clone()),
        );
    }

    for (key, value) in &intent.parameters {
        params.insert(key.clone(), value.clone());
    }
    if let Some(additional) = additional {
        for (key, value) in additional {
            params.insert(key.clone(), value.clone());
        }
    }

    params
}

/// Substitute `{params}`/`{context}` or append them as JSON sections
///
/// Other braces in the template are left as they are.
pub fn format_prompt(
    template: &str,
    params: &Map<String, Value>,
    context: &ExecutionContext,
) -> Result<String> {
    let params_json = serde_json::to_string_pretty(params)
        .map_err(|e| AgentError::Internal(format!("failed to encode parameters: {}", e)))?;
    let context_json = serde_json::to_string_pretty(context)
        .map_err(|e| AgentError::Internal(format!("failed to encode context: {}", e)))?;

    let mut prompt = template.to_string();

    if prompt.contains(PARAMS_PLACEHOLDER) {
        prompt = prompt.replace(PARAMS_PLACEHOLDER, &params_json);
    } else {
        prompt.push_str("\n\n## Input parameters\n```json\n");
        prompt.push_str(&params_json);
        prompt.push_str("\n```");
    }

    if prompt.contains(CONTEXT_PLACEHOLDER) {
        prompt = prompt.replace(CONTEXT_PLACEHOLDER, &context_json);
    } else if !context.is_empty() {
        prompt.push_str("\n\n## Learner context\n```json\n");
        prompt.push_str(&context_json);
        prompt.push_str("\n```");
    }

    Ok(prompt)
}

/// Parse generated text and hold it to the skill's output contract
fn contract_output(
    skill: &SkillDefinition,
    text: &str,
) -> std::result::Result<Value, ProviderError> {
    let value =
        parse_structured(text).map_err(|e| ProviderError::InvalidStructuredOutput(e.to_string()))?;
    validate_output(skill, &value)?;
    Ok(value)
}

/// Result must be an object carrying every field the output schema requires
fn validate_output(
    skill: &SkillDefinition,
    value: &Value,
) -> std::result::Result<(), ProviderError> {
    let object = value.as_object().ok_or_else(|| {
        ProviderError::InvalidStructuredOutput(format!(
            "skill '{}' returned a non-object result",
            skill.id
        ))
    })?;

    if let Some(missing) = skill
        .required_output_fields()
        .into_iter()
        .find(|field| !object.contains_key(*field))
    {
        return Err(ProviderError::InvalidStructuredOutput(format!(
            "skill '{}' result is missing required field '{}'",
            skill.id, missing
        )));
    }

    Ok(())
}
