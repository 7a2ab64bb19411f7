//! Configuration management for apiforge.
//!
//! This module defines the `Config` struct and related settings. The
//! configuration can be created programmatically with defaults, or loaded from
//! a YAML or TOML file (chosen by extension). Every value is threaded through
//! the generation pipeline explicitly; nothing is read from global state.
//!
//! # Examples
//!
//! ```no_run
//! use apiforge_core::config::Config;
//!
//! # #[tokio::main]
//! # async fn main() -> apiforge_core::Result<()> {
//! let mut config = Config::default();
//! config.generation.max_repair_rounds = 3;
//! config.save("apiforge.yaml").await?;
//!
//! let loaded = Config::from_file("apiforge.yaml").await?;
//! assert_eq!(loaded.generation.max_repair_rounds, 3);
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::skills::Depth;

// External imports (alphabetized)
use serde::{Deserialize, Deserializer, Serialize};
use serde_value::Value as SerdeValue;
use tokio::fs;
use url::Url;

/// Default number of repair rounds after the first validation pass
pub const DEFAULT_MAX_REPAIR_ROUNDS: usize = 2;

/// Top-level configuration for apiforge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Language model provider settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Values baked into the generated project
    #[serde(default)]
    pub project: ProjectConfig,
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API
    #[default]
    Anthropic,
    /// Any OpenAI-compatible chat completions API
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Language model provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model identifier sent to the provider
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Override for the provider endpoint (e.g. a local gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Deadline for a single model call
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Endpoint base URL, falling back to the provider's public API
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_ref()
            .map(|u| u.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// Name of the environment variable holding the API key
    pub fn resolved_api_key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| self.provider.default_api_key_env().to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model_name(),
            base_url: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Repair rounds allowed after the first validation pass
    #[serde(default = "default_max_repair_rounds")]
    pub max_repair_rounds: usize,

    /// Test-case depth
    #[serde(default)]
    pub depth: Depth,

    /// Directory whose files override the embedded prompts by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_repair_rounds: DEFAULT_MAX_REPAIR_ROUNDS,
            depth: Depth::default(),
            prompt_dir: None,
        }
    }
}

/// Validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Whether to run the test discovery check at all
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    /// Discovery command; the project directory is appended as last argument
    #[serde(
        default = "default_discovery_command",
        deserialize_with = "deserialize_command"
    )]
    pub discovery: Vec<String>,

    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Interpreter used to compile Python artifacts; an empty list leaves
    /// only the built-in grammar check
    #[serde(
        default = "default_python_command",
        deserialize_with = "deserialize_command"
    )]
    pub python: Vec<String>,
}

impl ValidationConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            discovery: default_discovery_command(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            python: default_python_command(),
        }
    }
}

/// Values rendered into the generated project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Default `API_BASE_URL` of the generated config module
    #[serde(default = "default_project_base_url")]
    pub base_url: Url,

    /// Base URLs for the CI pipeline's deployable environments
    #[serde(default)]
    pub environments: CiEnvironments,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            base_url: default_project_base_url(),
            environments: CiEnvironments::default(),
        }
    }
}

/// Base URL per CI environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiEnvironments {
    pub dev: Url,
    pub staging: Url,
    pub prod: Url,
}

impl Default for CiEnvironments {
    fn default() -> Self {
        Self {
            dev: parse_static_url("https://dev-api.example.com"),
            staging: parse_static_url("https://staging-api.example.com"),
            prod: parse_static_url("https://api.example.com"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, or TOML when the extension is `.toml`
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let config = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }

    /// Save configuration to a file, using the same format rule as `from_file`
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| crate::Error::config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_yaml::to_string(self)?
        };
        fs::write(path, content).await?;
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn parse_static_url(s: &str) -> Url {
    Url::parse(s).unwrap_or_else(|e| panic!("invalid built-in URL {}: {}", s, e))
}

fn default_model_name() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_model_timeout_secs() -> u64 {
    120
}

fn default_max_repair_rounds() -> usize {
    DEFAULT_MAX_REPAIR_ROUNDS
}

fn default_true() -> bool {
    true
}

fn default_discovery_command() -> Vec<String> {
    ["python", "-m", "pytest", "--collect-only", "-q"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_python_command() -> Vec<String> {
    vec!["python3".to_string()]
}

fn default_discovery_timeout_secs() -> u64 {
    60
}

fn default_project_base_url() -> Url {
    parse_static_url("http://localhost:8080")
}

/// Accept either a single command line or a list of arguments
fn deserialize_command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = SerdeValue::deserialize(deserializer)?;

    match value {
        SerdeValue::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        SerdeValue::Seq(seq) => {
            let mut result = Vec::new();
            for item in seq {
                if let SerdeValue::String(s) = item {
                    result.push(s);
                } else {
                    return Err(serde::de::Error::custom(
                        "Expected string or array of strings",
                    ));
                }
            }
            Ok(result)
        }
        _ => Err(serde::de::Error::custom(
            "Expected string or array of strings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_roundtrip_yaml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("apiforge.yaml");

        let mut config = Config::default();
        config.generation.max_repair_rounds = 4;
        config.save(&file_path).await?;

        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded, config);
        assert_eq!(loaded.generation.max_repair_rounds, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_config_roundtrip_toml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("apiforge.toml");

        let config = Config::default();
        config.save(&file_path).await?;

        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generation.max_repair_rounds, 2);
        assert_eq!(config.model.name, "claude-sonnet-4-20250514");
        assert_eq!(config.model.resolved_api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(config.model.resolved_base_url(), "https://api.anthropic.com");
        assert_eq!(config.project.base_url.as_str(), "http://localhost:8080/");
        assert!(config.validation.discovery_enabled);
        assert_eq!(config.validation.discovery[0], "python");
        assert_eq!(config.validation.python, vec!["python3"]);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str(
            "model:\n  provider: openai\n  name: gpt-4o\nvalidation:\n  discovery: pytest --collect-only\n",
        )
        .unwrap();
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model.resolved_api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.validation.discovery, vec!["pytest", "--collect-only"]);
        assert_eq!(config.generation.max_repair_rounds, 2);
    }

    #[test]
    fn test_discovery_command_list_form() {
        let config: ValidationConfig =
            serde_yaml::from_str("discovery: [\"py.test\", \"--co\"]\n").unwrap();
        assert_eq!(config.discovery, vec!["py.test", "--co"]);
        assert!(config.discovery_enabled);
        assert_eq!(config.python, vec!["python3"]);

        let config: ValidationConfig = serde_yaml::from_str("python: []\n").unwrap();
        assert!(config.python.is_empty());

        let bad: Result<ValidationConfig, _> = serde_yaml::from_str("discovery: [1, 2]\n");
        assert!(bad.is_err());
    }
}
