//! Configuration management for Amica.
//!
//! The bot reads a single JSON file at `~/.amica/config.json`. Every section
//! has serde defaults, so an empty or missing file yields a working local
//! setup (Ollama on localhost, in-memory sessions, terminal chat).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `AMICA_LOG_LEVEL` → observability.log_level
//! - `AMICA_LOG_FORMAT` → observability.log_format
//! - `AMICA_GENERATION_BACKEND` → generation.backend
//! - `AMICA_GENERATION_URL` → generation.base_url
//! - `AMICA_MODEL` → generation.model
//! - `AMICA_ADAPTER` → generation.adapter
//! - `BOT_TOKEN` → telegram.bot_token (and enables Telegram)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".amica"),
        |dirs| dirs.home_dir().join(".amica"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Expand `~` and environment variables in a configured path.
fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map_or_else(|_| raw.to_string(), |p| p.into_owned()))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Text generation backend and sampling parameters
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Persona escalation thresholds and preamble overrides
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Turn templates wrapping each utterance
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Session store and transcript archive locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram transport
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or an explicit one) and apply
    /// environment variable overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("AMICA_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("AMICA_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(backend) = lookup("AMICA_GENERATION_BACKEND") {
            self.generation.backend = backend;
        }
        if let Some(url) = lookup("AMICA_GENERATION_URL") {
            self.generation.base_url = url;
        }
        if let Some(model) = lookup("AMICA_MODEL") {
            self.generation.model = model;
        }
        if let Some(adapter) = lookup("AMICA_ADAPTER").filter(|a| !a.is_empty()) {
            self.generation.adapter = Some(adapter);
        }
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = Some(token);
            self.telegram.enabled = true;
        }
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create config directory {}", dir.display())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Generation
// ============================================================================

/// Text generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Backend kind: "ollama" or "tgi"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Base URL of the inference server
    #[serde(default = "default_generation_url")]
    pub base_url: String,

    /// Model name (Ollama tag; informational for TGI)
    #[serde(default = "default_model")]
    pub model: String,

    /// Fine-tuned adapter identifier (TGI `adapter_id`)
    #[serde(default)]
    pub adapter: Option<String>,

    /// Upper bound on a single generation, queue wait included
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Number of pending generation requests the worker queue accepts
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Sampling parameters sent with every request
    #[serde(default)]
    pub params: GenerationParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_url: default_generation_url(),
            model: default_model(),
            adapter: None,
            timeout_secs: default_generation_timeout(),
            queue_capacity: default_queue_capacity(),
            params: GenerationParams::default(),
        }
    }
}

fn default_backend() -> String {
    "ollama".into()
}

fn default_generation_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama2:7b-chat".into()
}

fn default_generation_timeout() -> u64 {
    300 // 7B models on a single GPU can take minutes on long transcripts
}

fn default_queue_capacity() -> usize {
    32
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Always 1: only one continuation is ever consumed
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: u32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
    /// Performance hint only
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_p: default_top_p(),
            temperature: default_temperature(),
            num_return_sequences: default_num_return_sequences(),
            max_new_tokens: default_max_new_tokens(),
            repetition_penalty: default_repetition_penalty(),
            use_cache: true,
        }
    }
}

fn default_top_k() -> u32 {
    50
}

fn default_top_p() -> f64 {
    0.95
}

fn default_temperature() -> f64 {
    1.0
}

fn default_num_return_sequences() -> u32 {
    1
}

fn default_max_new_tokens() -> u32 {
    128
}

fn default_repetition_penalty() -> f64 {
    1.15
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Persona
// ============================================================================

/// Persona escalation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Exchanges after which the familiar persona takes over
    #[serde(default = "default_familiar_after")]
    pub familiar_after: u64,

    /// Exchanges after which the intimate persona takes over
    #[serde(default = "default_intimate_after")]
    pub intimate_after: u64,

    /// Optional replacement preamble texts
    #[serde(default)]
    pub preambles: PreambleOverrides,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            familiar_after: default_familiar_after(),
            intimate_after: default_intimate_after(),
            preambles: PreambleOverrides::default(),
        }
    }
}

fn default_familiar_after() -> u64 {
    10
}

fn default_intimate_after() -> u64 {
    30
}

/// Preamble overrides; `None` keeps the built-in text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreambleOverrides {
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub familiar: Option<String>,
    #[serde(default)]
    pub intimate: Option<String>,
}

// ============================================================================
// Templates
// ============================================================================

/// Turn templates. Each must contain exactly one `{placeholder}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_user_turn")]
    pub user_turn: String,

    #[serde(default = "default_model_turn")]
    pub model_turn: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            user_turn: default_user_turn(),
            model_turn: default_model_turn(),
        }
    }
}

fn default_user_turn() -> String {
    "User: {user_message} [/INST]".into()
}

fn default_model_turn() -> String {
    "Friend: {model_answer} </s><s>[INST]".into()
}

// ============================================================================
// Storage
// ============================================================================

/// Session store and archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite database for sessions; in-memory store when unset
    #[serde(default)]
    pub sessions_db: Option<String>,

    /// Directory for transcript archives written on reset; disabled when unset
    #[serde(default)]
    pub archive_dir: Option<String>,
}

impl StorageConfig {
    /// Expanded sessions database path, if configured.
    pub fn sessions_db_path(&self) -> Option<PathBuf> {
        self.sessions_db.as_deref().map(expand_path)
    }

    /// Expanded archive directory, if configured.
    pub fn archive_dir_path(&self) -> Option<PathBuf> {
        self.archive_dir.as_deref().map(expand_path)
    }
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bot API token (`BOT_TOKEN` env var takes priority)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Usernames or numeric ids allowed to talk to the bot; `*` for everyone
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            allowed_users: default_allowed_users(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
