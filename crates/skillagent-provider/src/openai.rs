use crate::error::{ProviderError, Result};
use crate::repair;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{GenerateRequest, GenerationProvider, ResponseFormat};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use skillagent_types::Provider as ProviderType;
use std::time::Instant;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a helpful learning assistant.";

const JSON_INSTRUCTION: &str = "\n\nIMPORTANT: You must respond with valid JSON only. \
Do not include any text before or after the JSON value.\n\nYour JSON response:";

/// Generation provider for OpenAI-compatible chat completion endpoints
pub struct OpenAiProvider {
    provider: ProviderType,
    client: Client<OpenAIConfig>,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// Create a provider for the configured backend
    pub fn new(provider: ProviderType) -> Self {
        let config = match &provider {
            ProviderType::OpenAI {
                api_key, base_url, ..
            } => {
                let mut config = OpenAIConfig::new();
                if let Some(key) = api_key.as_ref().filter(|k| !k.is_empty()) {
                    config = config.with_api_key(key);
                }
                if let Some(url) = base_url.as_ref().filter(|u| !u.is_empty()) {
                    config = config.with_api_base(url);
                }
                config
            }
            // Ollama exposes an OpenAI-compatible API
            ProviderType::Ollama { base_url, .. } => OpenAIConfig::new().with_api_base(base_url),
        };

        info!(
            "Provider initialized: {} (default model {})",
            provider.name(),
            provider.default_model()
        );

        Self {
            client: Client::with_config(config),
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    /// One chat completion round-trip
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        use async_openai::types::chat::{
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            CreateChatCompletionRequestArgs,
        };

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_completion_tokens(max_tokens)
            .temperature(temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if text.trim().is_empty() {
            warn!("{} returned no content for model {}", self.provider.name(), model);
            return Err(ProviderError::EmptyResponse {
                model: model.to_string(),
            });
        }

        Ok(text.trim().to_string())
    }

    /// One attempt including structured-output validation
    async fn attempt(
        &self,
        model: &str,
        prompt: &str,
        request: &GenerateRequest,
        attempt: u32,
    ) -> Result<String> {
        let started = Instant::now();
        info!(attempt = attempt + 1, "Calling {}: model={}, tokens<={}", self.provider.name(), model, request.max_tokens);

        let text = self
            .complete(model, prompt, request.max_tokens, request.temperature)
            .await?;

        debug!(
            "Response received in {:.2}s, length={}",
            started.elapsed().as_secs_f64(),
            text.len()
        );

        match request.response_format {
            ResponseFormat::Text => Ok(text),
            ResponseFormat::Structured => {
                let value = repair::parse_structured(&text)
                    .map_err(|e| ProviderError::InvalidStructuredOutput(e.to_string()))?;
                Ok(value.to_string())
            }
        }
    }
}

/// Ask for JSON explicitly unless the prompt already does
fn enhance_json_prompt(prompt: &str) -> String {
    if prompt.to_uppercase().contains("JSON") {
        prompt.to_string()
    } else {
        format!("{}{}", prompt, JSON_INSTRUCTION)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let model = if request.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            request.model.clone()
        };

        let prompt = match request.response_format {
            ResponseFormat::Text => request.prompt.clone(),
            ResponseFormat::Structured => enhance_json_prompt(&request.prompt),
        };

        let policy = self.retry.with_max_attempts(request.max_retries);
        let this = self;
        let model = model.as_str();
        let prompt = prompt.as_str();
        let request = &request;

        retry_with_backoff(&policy, "generation", move |attempt| async move {
            this.attempt(model, prompt, request, attempt).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_instruction_added_once() {
        let enhanced = enhance_json_prompt("Give me three questions");
        assert!(enhanced.ends_with("Your JSON response:"));

        let untouched = enhance_json_prompt("Reply in json with fields a, b");
        assert_eq!(untouched, "Reply in json with fields a, b");
    }

    #[test]
    fn test_default_model_comes_from_backend() {
        let provider = OpenAiProvider::new(ProviderType::ollama("llama3", "http://localhost:11434/v1"));
        assert_eq!(provider.default_model(), "llama3");
        assert_eq!(provider.name(), "ollama");
    }
}
