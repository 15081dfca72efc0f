//! Intent router
//!
//! Classifies a message into one or more [`IntentResult`]s with the
//! generation provider. Unusable classifier output never escapes as an
//! error: it degrades to a single "other" result with confidence 0.0.
//! Provider failures (network, auth) still propagate.

use serde_json::{Map, Value};
use skillagent_provider::{parse_structured, GenerateRequest, GenerationProvider, ProviderError};
use skillagent_types::{IntentLabel, IntentResult, MemorySummary};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimum confidence required to act on a classified intent
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Confidence assumed when the classifier omits it
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const CLASSIFIER_MAX_TOKENS: u32 = 500;
const CLASSIFIER_TEMPERATURE: f32 = 0.2;

/// Rendered placeholder for absent summary fields
const ABSENT: &str = "None";

const DEFAULT_TEMPLATE: &str = r#"You are the intent classifier of a learning assistant.
Classify the user's message into one of these INTENT labels:
- quiz: the user wants practice problems or a quiz (target_artifact "quiz_set")
- explain: the user wants a concept explained (target_artifact "explanation")
- flashcard: the user wants flashcards to memorise something (target_artifact "flashcard_set")
- other: anything unrelated to learning, greetings, or unclear requests

Memory:
- current topic: {topic_hint}
- mastery of that topic: {user_mastery_hint}
- recent behavior: {recent_behavior}

Use the memory to resolve follow-ups such as "more of those" or "explain that one again".
If the message asks for several things in sequence ("explain X then quiz me"), return a JSON
array with one object per request, in the order requested. Otherwise return one JSON object.

Each object has the fields:
{"intent": "<label>", "topic": "<topic or null>", "target_artifact": "<type or null>",
 "confidence": <0.0-1.0>, "parameters": {"quantity": <int>, "difficulty": "<easy|medium|hard>"}}

User message: {message}

Respond with JSON only."#;

/// Message classifier
pub struct IntentRouter {
    provider: Arc<dyn GenerationProvider>,
    model: String,
    template: String,
}

impl IntentRouter {
    pub fn new(provider: Arc<dyn GenerationProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Replace the classification prompt; it should keep the `{message}` placeholder
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the classification prompt
    ///
    /// Substituted values are never scanned for placeholders again.
    pub fn format_prompt(&self, message: &str, summary: Option<&MemorySummary>) -> String {
        let topic_hint = summary
            .and_then(|s| s.topic_hint.as_deref())
            .unwrap_or(ABSENT);
        let mastery_hint = summary
            .and_then(|s| s.user_mastery_hint)
            .map_or(ABSENT, |m| m.as_str());
        let recent_behavior = summary
            .map(|s| s.recent_behavior.as_str())
            .filter(|b| !b.is_empty())
            .unwrap_or(ABSENT);

        render(
            &self.template,
            &[
                ("message", message),
                ("topic_hint", topic_hint),
                ("user_mastery_hint", mastery_hint),
                ("recent_behavior", recent_behavior),
            ],
        )
    }

    /// Classify one message
    pub async fn parse(
        &self,
        message: &str,
        summary: Option<&MemorySummary>,
    ) -> Result<Vec<IntentResult>, ProviderError> {
        if message.trim().is_empty() {
            debug!("Empty message, skipping classification");
            return Ok(vec![IntentResult::fallback(message)]);
        }

        let request = GenerateRequest::new(self.format_prompt(message, summary), &self.model)
            .structured()
            .with_max_tokens(CLASSIFIER_MAX_TOKENS)
            .with_temperature(CLASSIFIER_TEMPERATURE);

        let text = match self.provider.generate(request).await {
            Ok(text) => text,
            Err(e) if e.is_invalid_output() => {
                warn!("Classifier output unusable: {}", e);
                return Ok(vec![IntentResult::fallback(message)]);
            }
            Err(e) => return Err(e),
        };

        let results = match interpret(&text, message) {
            Some(results) => results,
            None => {
                warn!("Could not interpret classifier output: {}", text);
                vec![IntentResult::fallback(message)]
            }
        };

        for result in &results {
            info!(
                intent = %result.intent,
                confidence = result.confidence,
                "Classified message"
            );
        }

        Ok(results)
    }

    /// Classify several messages one after another, flattening results in order
    pub async fn parse_batch(&self, messages: &[String]) -> Result<Vec<IntentResult>, ProviderError> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.extend(self.parse(message, None).await?);
        }
        Ok(results)
    }
}

/// Turn classifier text into results; `None` when any record is malformed
fn interpret(text: &str, raw_text: &str) -> Option<Vec<IntentResult>> {
    let value = parse_structured(text).ok()?;

    let records = match value {
        Value::Array(items) if items.is_empty() => return None,
        Value::Array(items) => items,
        Value::Object(map) => vec![Value::Object(map)],
        _ => return None,
    };

    records
        .iter()
        .map(|record| record.as_object().and_then(|r| to_intent(r, raw_text)))
        .collect()
}

fn optional_string(record: &Map<String, Value>, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn to_intent(record: &Map<String, Value>, raw_text: &str) -> Option<IntentResult> {
    let intent = match record.get("intent")? {
        Value::String(label) if !label.trim().is_empty() => IntentLabel::Single(label.trim().to_string()),
        Value::Array(labels) if !labels.is_empty() => IntentLabel::Multiple(
            labels
                .iter()
                .map(|l| l.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    };

    let confidence = match record.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(value) => value.as_f64().filter(|c| (0.0..=1.0).contains(c))?,
    };

    let mut result = IntentResult::new(intent, confidence, raw_text);
    result.topic = optional_string(record, "topic");
    result.target_artifact = optional_string(record, "target_artifact");
    if let Some(Value::Object(parameters)) = record.get("parameters") {
        result.parameters = parameters.clone();
    }

    Some(apply_threshold(result))
}

/// Below the threshold the label collapses to "other" and the target is
/// cleared; the confidence value is kept as reported
pub fn apply_threshold(mut result: IntentResult) -> IntentResult {
    if result.confidence < CONFIDENCE_THRESHOLD {
        debug!(
            "Confidence {:.2} below {:.2}, treating '{}' as other",
            result.confidence, CONFIDENCE_THRESHOLD, result.intent
        );
        result.intent = IntentLabel::other();
        result.target_artifact = None;
    }
    result
}

/// Single-pass `{name}` substitution; unknown braces are kept
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after_brace = &rest[start + 1..];

        let hit = values.iter().find_map(|(name, value)| {
            after_brace
                .strip_prefix(*name)?
                .strip_prefix('}')
                .map(|tail| (*value, tail))
        });

        match hit {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after_brace;
            }
        }
    }

    out.push_str(rest);
    out
}
