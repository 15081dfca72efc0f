//! Skill execution against scripted generation output

mod common;

use common::{BrokenRemote, ContendedSessions, Fixture, ScriptedProvider};
use serde_json::{json, Map};
use skillagent_core::AgentError;
use skillagent_persistence::ArtifactStore;
use skillagent_provider::{ProviderError, ResponseFormat};
use skillagent_types::{ErrorKind, IntentLabel, IntentResult, StorageType};
use std::sync::Arc;

fn quiz_intent() -> IntentResult {
    IntentResult::new("quiz", 0.9, "给我出几道数学题").with_topic("数学")
}

#[tokio::test]
async fn test_quiz_execution_updates_memory() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::ok(&[r#"{"questions": [{"q": "1+1?", "a": "2"}]}"#]);
    let memory = fixture.memory();
    let orchestrator = fixture.orchestrator(provider.clone(), memory.clone());

    let envelope = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap();

    assert!(envelope.success);
    assert_eq!(envelope.skill_id.as_deref(), Some("quiz_skill"));
    assert_eq!(envelope.skill_name.as_deref(), Some("Quiz Generator"));
    assert_eq!(envelope.result.as_ref().unwrap()["questions"][0]["a"], "2");
    let artifact_id = envelope.artifact_id.clone().unwrap();
    assert!(artifact_id.starts_with("artifact_quiz-skill_数学_"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "quiz-primary");
    assert_eq!(requests[0].response_format, ResponseFormat::Structured);
    // Unknown placeholders survive; parameters are appended as JSON
    assert!(requests[0].prompt.contains("Generate a quiz about {topic}"));
    assert!(requests[0].prompt.contains(r#""topic": "数学""#));
    assert!(requests[0].prompt.contains("Learner context"));

    let session = memory.get_session_context("s1").await.unwrap();
    assert_eq!(session.current_topic.as_deref(), Some("数学"));
    assert_eq!(session.recent_intents.back().map(String::as_str), Some("quiz"));
    assert_eq!(session.last_user_message, "给我出几道数学题");
    assert_eq!(session.last_artifact_id(), Some(artifact_id.as_str()));
    assert_eq!(session.artifact_history[0].summary, "1 questions on 数学");

    let profile = memory.get_user_profile("u1").await.unwrap();
    assert_eq!(profile.history.count("quiz_sessions"), 1);
    assert_eq!(profile.history.topics_visited, vec!["数学".to_string()]);

    let stored = memory.get_artifact(&artifact_id).await.unwrap();
    assert_eq!(stored, envelope.result.unwrap());
}

#[tokio::test]
async fn test_unknown_intent_reports_no_skill_found() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::ok(&[]);
    let memory = fixture.memory();
    let orchestrator = fixture.orchestrator(provider.clone(), memory.clone());

    let envelope = orchestrator
        .execute(&IntentResult::new("dance", 0.9, "teach me to dance"), "u1", "s1", None)
        .await
        .unwrap();

    assert!(!envelope.success);
    assert_eq!(envelope.error, Some(ErrorKind::NoSkillFound));
    assert!(envelope.message.unwrap().contains("dance"));
    assert!(provider.requests().is_empty());
    assert!(memory
        .get_session_context("s1")
        .await
        .unwrap()
        .artifact_history
        .is_empty());
}

#[tokio::test]
async fn test_hybrid_label_uses_first_matching_label() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::ok(&[r#"{"concept": "limit", "explanation": "..."}"#]);
    let orchestrator = fixture.orchestrator(provider.clone(), fixture.memory());

    let intent = IntentResult::new(
        IntentLabel::Multiple(vec!["dance".into(), "explain".into(), "quiz".into()]),
        0.8,
        "explain limits then quiz me",
    );
    let envelope = orchestrator.execute(&intent, "u1", "s1", None).await.unwrap();

    assert_eq!(envelope.skill_id.as_deref(), Some("explain_skill"));
    assert_eq!(provider.requests()[0].model, "explain-primary");
}

#[tokio::test]
async fn test_fallback_model_after_primary_failure() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::Transport("connection reset".into())),
        Ok(r#"{"questions": []}"#.into()),
    ]);
    let orchestrator = fixture.orchestrator(provider.clone(), fixture.memory());

    let envelope = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap();

    assert!(envelope.success);
    let models: Vec<_> = provider.requests().into_iter().map(|r| r.model).collect();
    assert_eq!(models, vec!["quiz-primary", "quiz-fallback"]);
}

fn large_quiz_reply() -> String {
    let questions: Vec<_> = (0..20)
        .map(|i| json!({"q": format!("What is the limit of sequence number {}?", i), "a": "0"}))
        .collect();
    let reply = json!({ "questions": questions }).to_string();
    assert!(reply.len() > 500);
    reply
}

#[tokio::test]
async fn test_missing_required_field_is_a_parse_error() {
    let fixture = Fixture::standard();
    let bad = r#"{"summary": "no concept here"}"#;
    let provider = ScriptedProvider::ok(&[bad, bad, bad]);
    let memory = fixture.memory();
    let orchestrator = fixture.orchestrator(provider.clone(), memory.clone());

    let err = orchestrator
        .execute(&IntentResult::new("explain", 0.9, "explain"), "u1", "s1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Parse(_)));
    assert!(err.to_string().contains("'concept'"));
    assert_eq!(err.to_envelope().error, Some(ErrorKind::Parse));
    // The whole attempt budget was spent on the only model
    assert_eq!(provider.requests().len(), 3);
    // Nothing written back on failure
    assert!(memory
        .get_session_context("s1")
        .await
        .unwrap()
        .recent_intents
        .is_empty());
}

#[tokio::test]
async fn test_output_missing_a_field_is_regenerated() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::ok(&[r#"{"summary": "no concept"}"#, r#"{"concept": "limit"}"#]);
    let memory = fixture.memory();
    let orchestrator = fixture.orchestrator(provider.clone(), memory.clone());

    let envelope = orchestrator
        .execute(&IntentResult::new("explain", 0.9, "explain limits"), "u1", "s1", None)
        .await
        .unwrap();

    assert!(envelope.success);
    assert_eq!(envelope.result.unwrap()["concept"], "limit");
    let models: Vec<_> = provider.requests().into_iter().map(|r| r.model).collect();
    assert_eq!(models, vec!["explain-primary", "explain-primary"]);

    let session = memory.get_session_context("s1").await.unwrap();
    assert_eq!(session.artifact_history.len(), 1);
}

#[tokio::test]
async fn test_fallback_model_after_contract_budget_is_spent() {
    let fixture = Fixture::standard();
    let bad = r#"{"items": []}"#;
    let provider = ScriptedProvider::ok(&[bad, "not json at all", bad, r#"{"questions": []}"#]);
    let orchestrator = fixture.orchestrator(provider.clone(), fixture.memory());

    let envelope = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap();

    assert!(envelope.success);
    let models: Vec<_> = provider.requests().into_iter().map(|r| r.model).collect();
    assert_eq!(
        models,
        vec!["quiz-primary", "quiz-primary", "quiz-primary", "quiz-fallback"]
    );
}

#[tokio::test]
async fn test_session_id_unusable_as_storage_key_is_rejected_up_front() {
    let fixture = Fixture::standard();
    let reply = large_quiz_reply();
    let provider = ScriptedProvider::ok(&[reply.as_str()]);
    let memory = fixture.memory();
    let orchestrator = fixture.orchestrator(provider.clone(), memory.clone());

    let err = orchestrator
        .execute(&quiz_intent(), "u1", "class/7b", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(provider.requests().is_empty());
    let session = memory.get_session_context("class/7b").await.unwrap();
    assert!(session.recent_intents.is_empty());
    assert!(session.artifact_history.is_empty());
    let profile = memory.get_user_profile("u1").await.unwrap();
    assert_eq!(profile.history.count("quiz_sessions"), 0);
}

#[tokio::test]
async fn test_lost_session_write_leaves_memory_untouched() {
    let fixture = Fixture::standard();
    let reply = large_quiz_reply();
    let provider = ScriptedProvider::ok(&[reply.as_str()]);
    let memory = fixture.memory_over(
        Arc::new(ContendedSessions::default()),
        ArtifactStore::new(fixture.artifacts_dir()),
    );
    let orchestrator = fixture.orchestrator(provider, memory.clone());

    let err = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    // No orphaned content, no half-applied session or profile
    assert_eq!(fixture.stored_files("s1"), 0);
    let session = memory.get_session_context("s1").await.unwrap();
    assert!(session.recent_intents.is_empty());
    assert!(session.current_topic.is_none());
    assert!(session.artifact_history.is_empty());
    let profile = memory.get_user_profile("u1").await.unwrap();
    assert_eq!(profile.history.count("quiz_sessions"), 0);
    assert!(profile.history.topics_visited.is_empty());
}

#[tokio::test]
async fn test_missing_prompt_template() {
    let fixture = Fixture::new();
    fixture.skill("quiz.yaml", common::QUIZ_SKILL);
    let orchestrator = fixture.orchestrator(ScriptedProvider::ok(&[]), fixture.memory());

    let err = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::ResourceNotFound(_)));
    assert!(err.to_string().contains("quiz.txt"));
}

#[tokio::test]
async fn test_caller_parameters_override_intent_parameters() {
    let fixture = Fixture::standard();
    let provider = ScriptedProvider::ok(&[r#"{"concept": "limit"}"#]);
    let orchestrator = fixture.orchestrator(provider.clone(), fixture.memory());

    let intent = IntentResult::new("explain", 0.9, "explain limits")
        .with_topic("limits")
        .with_parameter("depth", json!("intro"));
    let mut additional = Map::new();
    additional.insert("depth".into(), json!("advanced"));

    orchestrator
        .execute(&intent, "u1", "s1", Some(&additional))
        .await
        .unwrap();

    let prompt = &provider.requests()[0].prompt;
    assert!(prompt.starts_with("Explain the concept.\n{"));
    assert!(prompt.contains(r#""depth": "advanced""#));
    assert!(!prompt.contains("intro"));
    // The explain skill does not ask for user memory
    assert!(!prompt.contains("memory_summary"));
    assert!(!prompt.contains("Learner context"));
}

#[tokio::test]
async fn test_large_result_falls_back_to_local_when_remote_write_fails() {
    let fixture = Fixture::standard();
    let reply = large_quiz_reply();

    let provider = ScriptedProvider::ok(&[reply.as_str()]);
    let memory = fixture.memory_with(
        ArtifactStore::new(fixture.artifacts_dir()).with_remote(Arc::new(BrokenRemote)),
    );
    let orchestrator = fixture.orchestrator(provider, memory.clone());

    let envelope = orchestrator
        .execute(&quiz_intent(), "u1", "s1", None)
        .await
        .unwrap();
    let artifact_id = envelope.artifact_id.unwrap();

    let session = memory.get_session_context("s1").await.unwrap();
    let record = session.find_artifact(&artifact_id).unwrap();
    assert_eq!(record.storage_type(), StorageType::Local);
    assert!(record.has_external_storage());
    assert_eq!(record.summary, "20 questions on 数学");

    let loaded = memory.get_artifact(&artifact_id).await.unwrap();
    assert_eq!(loaded["questions"].as_array().unwrap().len(), 20);
}
