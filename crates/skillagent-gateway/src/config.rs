use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[providers]
default = "openai"  # or "ollama"

[providers.openai]
api_key = ""  # Set via OPENAI_API_KEY env var
model = "gpt-4o-mini"
base_url = ""  # Optional: Set via OPENAI_BASE_URL env var

[providers.ollama]
base_url = "http://localhost:11434/v1"
model = "llama3"

[generation]
max_tokens = 2000
temperature = 0.7
max_retries = 3
classifier_model = ""    # Empty: provider default model
conversation_model = ""  # Empty: provider default model

[skills]
config_dir = "skills"
prompts_dir = "prompts"

[storage]
state_db = "~/.skillagent/state.db"  # ":memory:" keeps state in process
artifacts_dir = "~/.skillagent/artifacts"
remote_url = ""  # Optional object store; set via SKILLAGENT_REMOTE_STORE_URL
remote_bucket = "skillagent-artifacts"
remote_token = ""

[logging]
level = "info"  # trace, debug, info, warn, error
json = false
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    pub default: String,
    pub openai: OpenAIConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    #[serde(default)]
    pub classifier_model: String,
    #[serde(default)]
    pub conversation_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SkillsConfig {
    pub config_dir: String,
    pub prompts_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_db: String,
    pub artifacts_dir: String,
    #[serde(default)]
    pub remote_url: String,
    #[serde(default)]
    pub remote_bucket: String,
    #[serde(default)]
    pub remote_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub generation: GenerationConfig,
    pub skills: SkillsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Get the global config path: ~/.skillagent/skillagent.toml
    fn global_config_path() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".skillagent").join("skillagent.toml"))
    }

    /// Ensure global config directory and file exist, creating defaults if needed
    fn ensure_global_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()?;

        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir)?;
                eprintln!("Created config directory: {}", config_dir.display());
            }
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())?;
            eprintln!("Created default config: {}", config_path.display());
            eprintln!("Please edit this file or set environment variables.");
        }

        Ok(config_path)
    }

    /// Load configuration with layered approach:
    /// 1. Global config: ~/.skillagent/skillagent.toml (auto-created if missing)
    /// 2. Local override: ./skillagent.toml (workspace, optional)
    /// 3. Environment variables (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let global_config_path = Self::ensure_global_config()?;

        let mut config_builder = config::Config::builder()
            // Built-in defaults so older config files keep working
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from(global_config_path))
            .add_source(config::File::with_name("skillagent").required(false))
            .add_source(config::Environment::with_prefix("SKILLAGENT").separator("__"));

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config_builder = config_builder.set_override("providers.openai.api_key", key)?;
        }

        if let Ok(url) = env::var("OPENAI_BASE_URL") {
            config_builder = config_builder.set_override("providers.openai.base_url", url)?;
        }

        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            config_builder = config_builder.set_override("providers.ollama.base_url", url)?;
        }

        if let Ok(url) = env::var("SKILLAGENT_REMOTE_STORE_URL") {
            config_builder = config_builder.set_override("storage.remote_url", url)?;
        }

        if let Ok(token) = env::var("SKILLAGENT_REMOTE_STORE_TOKEN") {
            config_builder = config_builder.set_override("storage.remote_token", token)?;
        }

        let config = config_builder.build()?;
        let config: Self = config.try_deserialize()?;
        Ok(config)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(extra, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config = parse("");
        assert_eq!(config.providers.default, "openai");
        assert_eq!(config.providers.openai.model, "gpt-4o-mini");
        assert_eq!(config.generation.max_retries, 3);
        assert_eq!(config.skills.config_dir, "skills");
        assert!(config.storage.remote_url.is_empty());
        assert!(config.generation.classifier_model.is_empty());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_later_source_wins() {
        let config = parse(
            r#"
[providers]
default = "ollama"

[storage]
remote_url = "http://localhost:9000"

[logging]
level = "debug"
json = true
"#,
        );
        assert_eq!(config.providers.default, "ollama");
        assert_eq!(config.providers.ollama.model, "llama3");
        assert_eq!(config.storage.remote_url, "http://localhost:9000");
        assert_eq!(config.storage.remote_bucket, "skillagent-artifacts");
        assert!(config.logging.json);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("skills"), PathBuf::from("skills"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.skillagent/a.db"), home.join(".skillagent/a.db"));
        }
    }
}
