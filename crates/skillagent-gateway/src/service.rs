use crate::config::{expand_home, Config};
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use skillagent_core::{
    Agent, GenerationSettings, IntentRouter, MemoryManager, SkillOrchestrator,
};
use skillagent_persistence::{
    generate_session_id, ArtifactStore, HttpObjectStore, InMemoryStateStore, SqliteStateStore,
    StateStore,
};
use skillagent_provider::{GenerationProvider, OpenAiProvider, RetryPolicy};
use skillagent_skills::SkillRegistry;
use skillagent_types::{ErrorKind, Provider, ResultEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const IN_MEMORY_DB: &str = ":memory:";

/// One line of input
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum GatewayRequest {
    Command {
        command: Command,
        #[serde(default)]
        session_id: Option<String>,
    },
    Message {
        user_id: String,
        /// A fresh session is started when absent
        #[serde(default)]
        session_id: Option<String>,
        message: String,
    },
}

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum Command {
    Info,
    Reload,
    Sessions,
    Cleanup,
}

/// Gateway service - main orchestrator
pub struct GatewayService {
    config: Config,
}

impl GatewayService {
    /// Create a new gateway service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the gateway service
    pub async fn run(self) -> Result<()> {
        skillagent_logging::init_logging(&self.config.logging.level, self.config.logging.json)?;
        info!("Starting SkillAgent Gateway Service");

        let agent = self.build_agent().await?;
        info!("Agent ready: {}", agent.info().await.overview.replace('\n', "; "));

        let shutdown = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
            info!("Received shutdown signal");
        };

        tokio::select! {
            result = serve_stdio(&agent) => {
                if let Err(e) = result {
                    error!("Gateway loop error: {}", e);
                }
            }
            _ = shutdown => {
                info!("Shutting down gracefully...");
            }
        }

        info!("Gateway service stopped");
        Ok(())
    }

    fn provider(&self) -> Provider {
        let providers = &self.config.providers;
        match providers.default.as_str() {
            "openai" => Provider::openai_full(
                &providers.openai.model,
                providers.openai.api_key.clone().filter(|k| !k.is_empty()),
                providers.openai.base_url.clone().filter(|u| !u.is_empty()),
            ),
            "ollama" => Provider::ollama(&providers.ollama.model, &providers.ollama.base_url),
            _ => {
                warn!("Unknown provider, defaulting to OpenAI");
                Provider::default()
            }
        }
    }

    async fn state_store(&self) -> Result<Arc<dyn StateStore>> {
        let path = &self.config.storage.state_db;
        if path.is_empty() || path == IN_MEMORY_DB {
            warn!("Using in-memory state; profiles and sessions are lost on exit");
            return Ok(Arc::new(InMemoryStateStore::new()));
        }

        let path = expand_home(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Arc::new(SqliteStateStore::new(&path.to_string_lossy()).await?))
    }

    fn artifact_store(&self) -> Result<ArtifactStore> {
        let storage = &self.config.storage;
        let store = ArtifactStore::new(expand_home(&storage.artifacts_dir));

        if storage.remote_url.is_empty() {
            return Ok(store);
        }

        let remote = HttpObjectStore::new(&storage.remote_url, &storage.remote_bucket)?
            .with_token(Some(storage.remote_token.clone()));
        Ok(store.with_remote(Arc::new(remote)))
    }

    async fn build_agent(&self) -> Result<Agent> {
        let generation = &self.config.generation;
        let provider: Arc<dyn GenerationProvider> = Arc::new(
            OpenAiProvider::new(self.provider())
                .with_retry_policy(RetryPolicy::default().with_max_attempts(generation.max_retries)),
        );
        info!("Provider service initialized: {}", provider.name());

        let memory = Arc::new(MemoryManager::new(
            self.state_store().await?,
            Arc::new(self.artifact_store()?),
        ));
        info!("Memory initialized");

        let registry = SkillRegistry::new(expand_home(&self.config.skills.config_dir));
        for failure in registry.load_errors() {
            warn!("Skipped skill file {}: {}", failure.path.display(), failure.message);
        }
        info!("Loaded {} skills", registry.len());

        let orchestrator = SkillOrchestrator::new(
            Arc::new(RwLock::new(registry)),
            provider.clone(),
            memory,
            expand_home(&self.config.skills.prompts_dir),
        )
        .with_settings(GenerationSettings {
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            max_retries: generation.max_retries,
        });

        let router = IntentRouter::new(provider, &generation.classifier_model);

        Ok(Agent::new(
            router,
            orchestrator,
            &generation.conversation_model,
        ))
    }
}

/// Read JSON requests line by line from stdin, answer one JSON line each
async fn serve_stdio(agent: &Agent) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(agent, &line).await;
        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

async fn handle_line(agent: &Agent, line: &str) -> Value {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(envelope) => return to_value(&envelope),
    };

    match request {
        GatewayRequest::Command { command, session_id } => match command {
            Command::Info => to_value(&agent.info().await),
            Command::Reload => {
                json!({ "success": true, "total_skills": agent.reload_skills().await })
            }
            Command::Sessions => match agent.list_sessions().await {
                Ok(sessions) => json!({ "success": true, "sessions": sessions }),
                Err(e) => to_value(&e.to_envelope()),
            },
            Command::Cleanup => {
                let Some(session_id) = session_id else {
                    return to_value(&ResultEnvelope::failure(
                        ErrorKind::Validation,
                        "cleanup requires a session_id",
                    ));
                };
                match agent.cleanup_session(&session_id).await {
                    Ok(()) => json!({ "success": true, "session_id": session_id }),
                    Err(e) => to_value(&e.to_envelope()),
                }
            }
        },
        GatewayRequest::Message {
            user_id,
            session_id,
            message,
        } => {
            let session_id = session_id.unwrap_or_else(generate_session_id);
            match agent.handle_message(&user_id, &session_id, &message).await {
                Ok(response) => to_value(&response),
                Err(e) => to_value(&e.to_envelope()),
            }
        }
    }
}

fn parse_request(line: &str) -> std::result::Result<GatewayRequest, ResultEnvelope> {
    serde_json::from_str(line).map_err(|e| {
        ResultEnvelope::failure(ErrorKind::Validation, format!("Invalid request: {}", e))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!("Failed to encode reply: {}", e);
        json!({
            "success": false,
            "error": ErrorKind::Internal.as_str(),
            "message": "Internal error, please try again later",
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_request() {
        let request =
            parse_request(r#"{"user_id": "u1", "session_id": "s1", "message": "quiz me"}"#)
                .unwrap();
        assert_eq!(
            request,
            GatewayRequest::Message {
                user_id: "u1".into(),
                session_id: Some("s1".into()),
                message: "quiz me".into(),
            }
        );

        let request = parse_request(r#"{"user_id": "u1", "message": "hi"}"#).unwrap();
        assert!(matches!(request, GatewayRequest::Message { session_id: None, .. }));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_request(r#"{"command": "info"}"#).unwrap(),
            GatewayRequest::Command {
                command: Command::Info,
                session_id: None,
            }
        );
        assert_eq!(
            parse_request(r#"{"command": "reload"}"#).unwrap(),
            GatewayRequest::Command {
                command: Command::Reload,
                session_id: None,
            }
        );
        assert_eq!(
            parse_request(r#"{"command": "cleanup", "session_id": "s1"}"#).unwrap(),
            GatewayRequest::Command {
                command: Command::Cleanup,
                session_id: Some("s1".into()),
            }
        );
    }

    #[test]
    fn test_unencodable_reply_uses_stable_kind() {
        struct Unencodable;

        impl serde::Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not encodable"))
            }
        }

        let reply = to_value(&Unencodable);
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "internal_error");
        assert_eq!(
            serde_json::to_value(ErrorKind::Internal).unwrap(),
            reply["error"]
        );
    }

    #[test]
    fn test_malformed_request_is_a_validation_failure() {
        for line in ["not json", r#"{"command": "shutdown"}"#, r#"{"user_id": "u1"}"#] {
            let envelope = parse_request(line).unwrap_err();
            assert!(!envelope.success);
            assert_eq!(envelope.error, Some(ErrorKind::Validation));
        }
    }
}
