//! Configuration loading, validation, and management for Roleplayer.
//!
//! Loads configuration from `~/.roleplayer/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use roleplayer_core::GenerationOptions;
use roleplayer_protocol::{ProtocolConfig, interpreter_prompt_for};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.roleplayer/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Sampling parameters sent with every request
    #[serde(default)]
    pub generation: GenerationOptions,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Prompt markup
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Built-in actions
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// How the backend is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// `/chat/completions` with structured messages
    #[default]
    Chat,
    /// `/completions` with a prompt rendered by the meta template
    Completion,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub mode: ProviderMode,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "internlm2-chat-7b".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            mode: ProviderMode::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("mode", &self.mode)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls per user message
    #[serde(default = "default_max_turn")]
    pub max_turn: usize,

    /// JSON pointer into the finish action's arguments that holds the final
    /// answer in streaming mode
    #[serde(default = "default_finish_response_pointer")]
    pub finish_response_pointer: String,

    /// Character the model plays; replaces the interpreter prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

fn default_max_turn() -> usize {
    3
}
fn default_finish_response_pointer() -> String {
    "/response".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turn: default_max_turn(),
            finish_response_pointer: default_finish_response_pointer(),
            role_name: None,
        }
    }
}

/// Built-in plugin actions that can be enabled by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginName {
    Calculator,
    Dice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Enabled plugins, in the order they are listed to the model
    #[serde(default = "default_plugins")]
    pub plugins: Vec<PluginName>,

    #[serde(default)]
    pub interpreter: InterpreterConfig,
}

fn default_plugins() -> Vec<PluginName> {
    vec![PluginName::Calculator, PluginName::Dice]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            plugins: default_plugins(),
            interpreter: InterpreterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program the code is handed to
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the code
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,

    #[serde(default = "default_interpreter_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_program() -> String {
    "python3".into()
}
fn default_program_args() -> Vec<String> {
    vec!["-c".into()]
}
fn default_interpreter_timeout() -> u64 {
    20
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_program(),
            args: default_program_args(),
            timeout_secs: default_interpreter_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.roleplayer/config.toml).
    ///
    /// Also checks environment variables:
    /// - `ROLEPLAYER_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `ROLEPLAYER_API_URL`
    /// - `ROLEPLAYER_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment variable overrides.
    pub fn apply_env(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("ROLEPLAYER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("ROLEPLAYER_API_URL") {
            self.provider.api_url = url;
        }

        if let Ok(model) = std::env::var("ROLEPLAYER_MODEL") {
            self.provider.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".roleplayer")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be between 0.0 and 1.0".into(),
            ));
        }

        if self.agent.max_turn == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turn must be at least 1".into(),
            ));
        }

        if !self.agent.finish_response_pointer.is_empty()
            && !self.agent.finish_response_pointer.starts_with('/')
        {
            return Err(ConfigError::ValidationError(format!(
                "agent.finish_response_pointer '{}' must be empty or start with '/'",
                self.agent.finish_response_pointer
            )));
        }

        if self.tools.interpreter.enabled && self.tools.interpreter.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.interpreter.timeout_secs must be > 0".into(),
            ));
        }

        self.protocol
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("protocol: {e}")))?;

        Ok(())
    }

    /// The protocol config with `agent.role_name` applied.
    pub fn effective_protocol(&self) -> ProtocolConfig {
        let mut protocol = self.protocol.clone();
        if let Some(role_name) = &self.agent.role_name {
            protocol.interpreter_prompt = interpreter_prompt_for(role_name);
        }
        protocol
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
