//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::Persona;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Persona used when the caller does not pick one
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Session store settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Prompt assembly settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Tool dispatch settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Retrieval augmentation settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Per-call-type timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Extra or overriding personas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personas: Vec<PersonaConfig>,
}

fn default_provider() -> String {
    "dashscope".into()
}
fn default_model() -> String {
    "qwen-max".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_persona() -> String {
    parley_core::persona::CODE_HELPER.into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_persona", &self.default_persona)
            .field("session", &self.session)
            .field("prompt", &self.prompt)
            .field("tools", &self.tools)
            .field("retrieval", &self.retrieval)
            .field("timeouts", &self.timeouts)
            .field("providers", &self.providers)
            .field("personas", &self.personas)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle seconds before a session is evicted. 0 disables eviction.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Newest turns loaded into each prompt
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// How often the reaper sweeps for idle sessions
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    1800
}
fn default_max_history_turns() -> usize {
    20
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl SessionConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_history_turns: default_max_history_turns(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Model input budget in estimated tokens
    #[serde(default = "default_input_budget")]
    pub input_budget_tokens: usize,
}

fn default_input_budget() -> usize {
    8192
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            input_budget_tokens: default_input_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Maximum model/tool round-trips per request
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Built-in tools to register
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,

    /// Search page queried by the `interview_questions` tool
    #[serde(default = "default_interview_search_url")]
    pub interview_search_url: String,
}

fn default_max_depth() -> u32 {
    5
}
fn default_enabled_tools() -> Vec<String> {
    vec!["knowledge_lookup".into(), "interview_questions".into()]
}
fn default_interview_search_url() -> String {
    "https://www.mianshiya.com/search/all".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            enabled: default_enabled_tools(),
            interview_search_url: default_interview_search_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Snippets injected per request
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Snippets scoring below this are discarded
    #[serde(default)]
    pub min_score: f32,

    /// Directory of `.md` / `.txt` documents to index at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_dir: Option<String>,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            min_score: 0.0,
            docs_dir: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_model_secs")]
    pub model_secs: u64,

    #[serde(default = "default_tool_secs")]
    pub tool_secs: u64,

    #[serde(default = "default_retrieval_millis")]
    pub retrieval_millis: u64,
}

fn default_model_secs() -> u64 {
    60
}
fn default_tool_secs() -> u64 {
    30
}
fn default_retrieval_millis() -> u64 {
    2000
}

impl TimeoutConfig {
    pub fn model(&self) -> Duration {
        Duration::from_secs(self.model_secs)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_secs)
    }

    pub fn retrieval(&self) -> Duration {
        Duration::from_millis(self.retrieval_millis)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            model_secs: default_model_secs(),
            tool_secs: default_tool_secs(),
            retrieval_millis: default_retrieval_millis(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    pub system_prompt: String,
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `PARLEY_API_KEY` (highest priority)
    /// - `DASHSCOPE_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PARLEY_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            // The environment wins over a per-provider model too.
            if let Some(provider) = config.providers.get_mut(&config.default_provider) {
                provider.default_model = None;
            }
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tools.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_depth must be at least 1".into(),
            ));
        }

        if self.prompt.input_budget_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.input_budget_tokens must be > 0".into(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_size".into(),
            ));
        }

        if self.persona(&self.default_persona).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "default_persona '{}' is not defined",
                self.default_persona
            )));
        }

        Ok(())
    }

    /// Built-in personas with configured ones merged over them by name.
    pub fn resolved_personas(&self) -> Vec<Persona> {
        let mut personas = Persona::builtins();
        for configured in &self.personas {
            let persona = Persona::new(&configured.name, &configured.system_prompt);
            match personas.iter_mut().find(|p| p.name == persona.name) {
                Some(existing) => *existing = persona,
                None => personas.push(persona),
            }
        }
        personas
    }

    /// Resolve a persona by name.
    pub fn persona(&self, name: &str) -> Option<Persona> {
        self.resolved_personas().into_iter().find(|p| p.name == name)
    }

    /// Model for the active provider.
    ///
    /// `[providers.<name>] default_model` overrides the top-level `default_model`.
    pub fn resolved_model(&self) -> String {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            default_persona: default_persona(),
            session: SessionConfig::default(),
            prompt: PromptConfig::default(),
            tools: ToolsConfig::default(),
            retrieval: RetrievalConfig::default(),
            timeouts: TimeoutConfig::default(),
            providers: HashMap::new(),
            personas: vec![],
        }
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
