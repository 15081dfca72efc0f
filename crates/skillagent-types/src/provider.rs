use serde::{Deserialize, Serialize};

/// Generation backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Provider {
    OpenAI {
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
    },
    Ollama {
        model: String,
        base_url: String,
    },
}

impl Provider {
    pub fn openai(model: impl Into<String>) -> Self {
        Self::OpenAI {
            model: model.into(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn openai_full(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        Self::OpenAI {
            model: model.into(),
            api_key,
            base_url,
        }
    }

    pub fn ollama(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::Ollama {
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Model used when a request does not name one
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI { .. } => "openai",
            Self::Ollama { .. } => "ollama",
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::openai("gpt-4o-mini")
    }
}
