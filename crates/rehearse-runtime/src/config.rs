//! Runtime configuration.
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or none at all) is a valid configuration. Durations use humantime
//! notation (`"1s"`, `"2m 30s"`).
//!
//! ```yaml
//! provider:
//!   type: anthropic
//! models:
//!   primary: claude-sonnet-4-5-20250929
//!   light: claude-haiku-4-5-20251001
//! workers: 3
//! start_stagger: 1s
//! call_timeout: 2m
//! retry:
//!   max_attempts: 3
//!   base_delay: 1s
//!   jitter: false
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::RetryPolicy;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter for `Duration` in humantime notation.
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Model capability tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelTier {
    /// Support and counterpart turns
    Primary,
    /// Termination classification and rubric scoring
    Light,
}

impl ModelTier {
    pub const ALL: [ModelTier; 2] = [ModelTier::Primary, ModelTier::Light];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Primary => "primary",
            ModelTier::Light => "light",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which provider to talk to and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registered provider type, e.g. `anthropic`
    #[serde(rename = "type")]
    pub kind: String,

    /// Override the API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key; `ANTHROPIC_API_KEY` is used when absent
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "anthropic".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

impl ProviderSettings {
    /// Options object handed to the provider factory.
    pub fn factory_options(&self) -> serde_json::Value {
        let mut options = serde_json::Map::new();
        if let Some(url) = &self.base_url {
            options.insert("base_url".to_string(), url.clone().into());
        }
        if let Some(key) = &self.api_key {
            options.insert("api_key".to_string(), key.expose_secret().into());
        }
        serde_json::Value::Object(options)
    }
}

/// Model ids per tier and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub primary: String,
    pub light: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            primary: "claude-sonnet-4-5-20250929".to_string(),
            light: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

impl ModelSettings {
    pub fn model_id(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.primary,
            ModelTier::Light => &self.light,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderSettings,

    pub models: ModelSettings,

    /// Conversations in flight at once
    pub workers: usize,

    /// Delay between successive conversation starts
    #[serde(with = "humantime_duration")]
    pub start_stagger: Duration,

    /// Deadline for every remote call
    #[serde(with = "humantime_duration")]
    pub call_timeout: Duration,

    /// Retry settings for classifier and judge calls
    pub retry: RetryPolicy,

    /// Bound on model/tool round trips per support turn
    pub max_tool_rounds: usize,

    /// Run the rubric judge after each conversation
    pub llm_evaluation: bool,

    /// Directory of markdown documents behind the knowledge tool
    pub knowledge_dir: PathBuf,

    /// Upper bound on support turns, applied on top of each scenario's own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            models: ModelSettings::default(),
            workers: 3,
            start_stagger: Duration::from_secs(1),
            call_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            max_tool_rounds: 5,
            llm_evaluation: true,
            knowledge_dir: PathBuf::from("knowledge"),
            max_turns: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loading runtime config");
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid("call_timeout must be positive".to_string()));
        }
        if self.max_turns == Some(0) {
            return Err(ConfigError::Invalid("max_turns must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Run conversations one at a time with no stagger.
    pub fn sequential(mut self) -> Self {
        self.workers = 1;
        self.start_stagger = Duration::ZERO;
        self
    }

    /// Retry policy for judgment calls, bounded by `call_timeout`.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .clone()
            .with_attempt_timeout(Some(self.call_timeout))
    }

    /// Completion settings for one model tier.
    pub fn completion_config(&self, tier: ModelTier) -> CompletionConfig {
        CompletionConfig {
            model: self.models.model_id(tier).to_string(),
            max_tokens: self.models.max_tokens,
            temperature: self.models.temperature,
            timeout: self.call_timeout,
        }
    }
}
