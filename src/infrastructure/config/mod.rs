//! Configuration management for the autograft agent.
//!
//! Settings load from a TOML file; secrets come from the environment only.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub repo: RepoConfig,
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path if present, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_fix_attempts == 0 {
            return Err(ConfigError::ValidationError {
                field: "agent.max_fix_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.agent.branch_prefix.is_empty() || !self.agent.branch_prefix.ends_with('/') {
            return Err(ConfigError::ValidationError {
                field: "agent.branch_prefix".into(),
                reason: "must be non-empty and end with '/'".into(),
            });
        }
        if self.llm.poll_backoff < 1.0 {
            return Err(ConfigError::ValidationError {
                field: "llm.poll_backoff".into(),
                reason: "must be >= 1.0".into(),
            });
        }
        for (field, max_tokens) in [
            ("llm.planner", &self.llm.planner),
            ("llm.builder", &self.llm.builder),
            ("llm.fixer", &self.llm.fixer),
            ("llm.reflect", &self.llm.reflect),
            ("llm.memory", &self.llm.memory),
        ] {
            if max_tokens.max_tokens < 1024 {
                return Err(ConfigError::ValidationError {
                    field: format!("{field}.max_tokens"),
                    reason: "must be at least 1024".into(),
                });
            }
        }
        Ok(())
    }
}

/// Model selection and ceilings for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseModelConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for PhaseModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 16_384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub planner: PhaseModelConfig,
    pub builder: PhaseModelConfig,
    pub fixer: PhaseModelConfig,
    pub reflect: PhaseModelConfig,
    pub memory: PhaseModelConfig,
    /// Extended-thinking budget in tokens, clamped to `max_tokens - 2048`.
    pub thinking_budget: u32,
    /// First poll delay after batch submission (seconds).
    pub poll_interval_secs: u64,
    /// Multiplier applied to the poll delay after each unfinished poll.
    pub poll_backoff: f64,
    /// Ceiling for the poll delay (seconds).
    pub max_poll_interval_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            planner: PhaseModelConfig::default(),
            builder: PhaseModelConfig::default(),
            fixer: PhaseModelConfig::default(),
            reflect: PhaseModelConfig::default(),
            memory: PhaseModelConfig {
                model: "claude-haiku-4-5".to_string(),
                max_tokens: 2048,
            },
            thinking_budget: 8192,
            poll_interval_secs: 5,
            poll_backoff: 1.5,
            max_poll_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,
    /// Local path of the working copy.
    pub workspace: String,
    pub main_branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            workspace: ".autograft/workspace".to_string(),
            main_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Prefix for every branch this agent creates.
    pub branch_prefix: String,
    /// Fix attempts before a patch session is exhausted.
    pub max_fix_attempts: u32,
    /// Soft token budget for the assembled memory context.
    pub memory_context_budget: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "autograft/".to_string(),
            max_fix_attempts: 3,
            memory_context_budget: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.autograft/autograft.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
    /// Optional directory for rolling file output.
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}

/// Secrets injected via the environment, never via the config file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
    pub github_token: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("ANTHROPIC_API_KEY".into()))?;
        let github_token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| ConfigError::MissingEnv("GITHUB_TOKEN".into()))?;
        Ok(Self {
            anthropic_api_key,
            github_token,
        })
    }
}
