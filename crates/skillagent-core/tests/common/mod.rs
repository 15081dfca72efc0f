//! Shared fixtures for core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use skillagent_core::{Agent, IntentRouter, MemoryManager, SkillOrchestrator};
use serde_json::Value;
use skillagent_persistence::{
    ArtifactStore, InMemoryStateStore, RemoteBackend, StateStore, StorageError, Versioned,
};
use skillagent_provider::{GenerateRequest, GenerationProvider, ProviderError, RetryPolicy};
use skillagent_skills::SkillRegistry;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::RwLock;

pub const QUIZ_SKILL: &str = r#"
id: quiz_skill
display_name: Quiz Generator
version: "1.0.0"
intent_tags: [quiz, practice]
input_schema:
  type: object
  properties:
    topic: {type: string}
output_schema:
  type: object
  required: [questions]
models:
  primary: quiz-primary
  fallback: quiz-fallback
context:
  need_user_memory: true
cost:
  model_class: medium
  context_size: 4000
  expected_rounds: 1
prompt_file: quiz.txt
"#;

pub const EXPLAIN_SKILL: &str = r#"
id: explain_skill
display_name: Concept Explainer
intent_tags: [explain]
input_schema: {type: object}
output_schema:
  type: object
  required: [concept]
models:
  primary: explain-primary
prompt_file: explain.txt
"#;

/// Provider returning queued replies in order and recording every request
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".into())))
    }
}

/// Remote backend that is reachable but rejects every write
pub struct BrokenRemote;

#[async_trait]
impl RemoteBackend for BrokenRemote {
    fn name(&self) -> &str {
        "broken"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn put(&self, key: &str, _body: Vec<u8>) -> skillagent_persistence::Result<()> {
        Err(skillagent_persistence::StorageError::Remote(format!(
            "write of {} refused",
            key
        )))
    }

    async fn get(&self, key: &str) -> skillagent_persistence::Result<Vec<u8>> {
        Err(skillagent_persistence::StorageError::NotFound(key.to_string()))
    }
}

/// State store where every session write loses to a concurrent writer
#[derive(Default)]
pub struct ContendedSessions {
    pub inner: InMemoryStateStore,
}

#[async_trait]
impl StateStore for ContendedSessions {
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> skillagent_persistence::Result<Option<Versioned>> {
        self.inner.get(namespace, key).await
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
    ) -> skillagent_persistence::Result<u64> {
        self.inner.put(namespace, key, value).await
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> skillagent_persistence::Result<u64> {
        if namespace == "sessions" {
            return Err(StorageError::VersionConflict {
                namespace: namespace.to_string(),
                key: key.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner
            .compare_and_swap(namespace, key, expected_version, value)
            .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> skillagent_persistence::Result<()> {
        self.inner.delete(namespace, key).await
    }
}

/// Temp directories holding skills, prompts and artifacts
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("skills")).unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::create_dir_all(dir.path().join("artifacts")).unwrap();
        Self { dir }
    }

    /// Quiz and explain skills with their prompt templates
    pub fn standard() -> Self {
        let fixture = Self::new();
        fixture.skill("01_quiz.yaml", QUIZ_SKILL);
        fixture.skill("02_explain.yaml", EXPLAIN_SKILL);
        fixture.prompt("quiz.txt", "Generate a quiz about {topic}. Respond in JSON.");
        fixture.prompt("explain.txt", "Explain the concept.\n{params}");
        fixture
    }

    pub fn skill(&self, name: &str, yaml: &str) {
        std::fs::write(self.dir.path().join("skills").join(name), yaml).unwrap();
    }

    pub fn prompt(&self, name: &str, template: &str) {
        std::fs::write(self.dir.path().join("prompts").join(name), template).unwrap();
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn memory(&self) -> Arc<MemoryManager> {
        self.memory_with(ArtifactStore::new(self.artifacts_dir()))
    }

    pub fn memory_with(&self, artifacts: ArtifactStore) -> Arc<MemoryManager> {
        self.memory_over(Arc::new(InMemoryStateStore::new()), artifacts)
    }

    pub fn memory_over(
        &self,
        state: Arc<dyn StateStore>,
        artifacts: ArtifactStore,
    ) -> Arc<MemoryManager> {
        Arc::new(MemoryManager::new(state, Arc::new(artifacts)))
    }

    /// Files stored for a session in the local artifact directory
    pub fn stored_files(&self, session_id: &str) -> usize {
        std::fs::read_dir(self.artifacts_dir().join(session_id))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn registry(&self) -> Arc<RwLock<SkillRegistry>> {
        Arc::new(RwLock::new(SkillRegistry::new(self.dir.path().join("skills"))))
    }

    pub fn orchestrator(
        &self,
        provider: Arc<dyn GenerationProvider>,
        memory: Arc<MemoryManager>,
    ) -> SkillOrchestrator {
        SkillOrchestrator::new(
            self.registry(),
            provider,
            memory,
            self.dir.path().join("prompts"),
        )
        .with_retry_policy(RetryPolicy::immediate(3))
    }

    pub fn agent(&self, provider: Arc<dyn GenerationProvider>) -> Agent {
        let router = IntentRouter::new(provider.clone(), "classifier");
        let orchestrator = self.orchestrator(provider, self.memory());
        Agent::new(router, orchestrator, "chat")
    }
}
