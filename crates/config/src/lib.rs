//! Configuration loading, validation, and management for toolflow.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! for secrets. All engine limits live here with serde defaults so a minimal
//! config file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use toolflow_core::{AgentProfile, WebhookToolDef};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider (env `TOOLFLOW_API_KEY` overrides).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Subprocess tool sessions to spawn at startup: name → command line.
    #[serde(default)]
    pub sessions: HashMap<String, SessionConfig>,

    /// Stored webhook tool definitions.
    #[serde(default)]
    pub custom_tools: Vec<WebhookToolDef>,

    /// Declared agents.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

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
            .field("provider", &self.provider)
            .field("engine", &self.engine)
            .field("gateway", &self.gateway)
            .field("embedding", &self.embedding)
            .field("sessions", &self.sessions)
            .field("custom_tools", &self.custom_tools.len())
            .field("agents", &self.agents.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            model: default_model(),
            api_url: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}

/// Engine limits. Every value has a serde default; override with care.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Turn budget for a single request.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Total prompt character cap (~100k tokens at 4 chars/token).
    #[serde(default = "default_prompt_char_cap")]
    pub prompt_char_cap: usize,

    /// Per-tool-output cap on what is appended to conversation context.
    #[serde(default = "default_context_char_cap")]
    pub context_char_cap: usize,

    /// Serialized-report size that triggers summary replacement + embedding.
    #[serde(default = "default_report_char_threshold")]
    pub report_char_threshold: usize,

    /// Report re-run throttle window per (session, report type).
    #[serde(default = "default_report_throttle_secs")]
    pub report_throttle_secs: i64,

    /// Active-RAG prompt reminders expire after this many seconds.
    #[serde(default = "default_rag_freshness_secs")]
    pub rag_freshness_secs: i64,

    /// Default rows per embedded chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rolling transcript capacity per (session, agent).
    #[serde(default = "default_transcript_capacity")]
    pub transcript_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            prompt_char_cap: default_prompt_char_cap(),
            context_char_cap: default_context_char_cap(),
            report_char_threshold: default_report_char_threshold(),
            report_throttle_secs: default_report_throttle_secs(),
            rag_freshness_secs: default_rag_freshness_secs(),
            chunk_size: default_chunk_size(),
            transcript_capacity: default_transcript_capacity(),
        }
    }
}

fn default_max_turns() -> usize {
    15
}
fn default_prompt_char_cap() -> usize {
    400_000
}
fn default_context_char_cap() -> usize {
    50_000
}
fn default_report_char_threshold() -> usize {
    30_000
}
fn default_report_throttle_secs() -> i64 {
    300
}
fn default_rag_freshness_secs() -> i64 {
    600
}
fn default_chunk_size() -> usize {
    50
}
fn default_transcript_capacity() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8700
}

/// Embedding provider settings. Changing these produces a NEW provider via
/// `toolflow_indexer::reconfigure`; providers are never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (deterministic hash embedder) or "http".
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            api_url: None,
            dimensions: default_embedding_dims(),
        }
    }
}

fn default_embedding_backend() -> String {
    "local".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dims() -> usize {
    256
}

/// A subprocess tool session: command plus arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AppConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TOOLFLOW_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(port) = std::env::var("TOOLFLOW_PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_turns == 0 {
            return Err(ConfigError::Invalid("engine.max_turns must be > 0".into()));
        }
        if self.engine.chunk_size == 0 {
            return Err(ConfigError::Invalid("engine.chunk_size must be > 0".into()));
        }
        if self.engine.context_char_cap < self.engine.report_char_threshold {
            return Err(ConfigError::Invalid(
                "engine.context_char_cap must be >= engine.report_char_threshold".into(),
            ));
        }
        for tool in &self.custom_tools {
            if tool.name.is_empty() || tool.url.is_empty() {
                return Err(ConfigError::Invalid(
                    "custom_tools entries require name and url".into(),
                ));
            }
        }
        Ok(())
    }
}
