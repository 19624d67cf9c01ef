//! Configuration loading, validation, and management for chatbridge.
//!
//! Loads configuration from `~/.chatbridge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Built-in system instruction used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant. Answer briefly (1-3 sentences) \
strictly from the information provided. If there is no data, answer: \"I have no information on \
this question.\" Format the answer as HTML with <p>...</p>, without <h1>-<h6> headings, <script> \
or <style>. Render links as <a href=\"URL\">Title</a>.";

/// The root configuration structure.
///
/// Maps directly to `~/.chatbridge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the completion and file API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL of the OAuth token endpoint
    #[serde(default = "default_oauth_base")]
    pub oauth_base: String,

    /// Model identifier sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// PEM bundle with extra root certificates for both endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<PathBuf>,

    /// Inline system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// File holding the system instruction (takes precedence over inline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<PathBuf>,

    /// Client credentials for the token endpoint
    #[serde(default)]
    pub auth: AuthConfig,

    /// Fixed file attached to outgoing requests
    #[serde(default)]
    pub attachment: AttachmentConfig,

    /// Per-call network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Session history storage
    #[serde(default)]
    pub history: HistoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_api_base() -> String {
    "https://gigachat.devices.sberbank.ru".into()
}
fn default_oauth_base() -> String {
    "https://ngw.devices.sberbank.ru:9443/".into()
}
fn default_model() -> String {
    "GigaChat-2-Pro".into()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// OAuth scope requested with the client credentials
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "GIGACHAT_API_B2B".into()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            scope: default_scope(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Attach `file` to every request
    #[serde(default)]
    pub always: bool,
}

impl AttachmentConfig {
    /// The file to attach, if attaching is switched on.
    pub fn active_file(&self) -> Option<&Path> {
        if self.always {
            self.file.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_token_secs")]
    pub token_secs: u64,

    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,

    #[serde(default = "default_completion_secs")]
    pub completion_secs: u64,
}

fn default_token_secs() -> u64 {
    20
}
fn default_upload_secs() -> u64 {
    120
}
fn default_completion_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            token_secs: default_token_secs(),
            upload_secs: default_upload_secs(),
            completion_secs: default_completion_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// "layered" (memory in front of files), "memory" or "file"
    #[serde(default = "default_history_backend")]
    pub backend: String,

    /// Directory for file-backed history (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_history_backend() -> String {
    "layered".into()
}

impl HistoryConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatbridge/config.toml),
    /// then apply `CHATBRIDGE_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
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

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// Values are trimmed and empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("CHATBRIDGE_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = get("CHATBRIDGE_OAUTH_BASE") {
            self.oauth_base = v;
        }
        if let Some(v) = get("CHATBRIDGE_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("CHATBRIDGE_CA_BUNDLE") {
            self.ca_bundle = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CHATBRIDGE_ATTACH_FILE") {
            self.attachment.file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CHATBRIDGE_ATTACH_ALWAYS") {
            self.attachment.always = parse_flag(&v);
        }
        if let Some(v) = get("CHATBRIDGE_CLIENT_ID") {
            self.auth.client_id = Some(v);
        }
        if let Some(v) = get("CHATBRIDGE_CLIENT_SECRET") {
            self.auth.client_secret = Some(v);
        }
        if let Some(v) = get("CHATBRIDGE_OAUTH_SCOPE") {
            self.auth.scope = v;
        }
        if let Some(v) = get("CHATBRIDGE_SYSTEM_PROMPT") {
            self.system_prompt = Some(v);
        }
        if let Some(v) = get("CHATBRIDGE_SYSTEM_PROMPT_FILE") {
            self.system_prompt_file = Some(PathBuf::from(v));
        }
    }

    /// Resolve the system instruction: a readable non-empty file first, then
    /// the inline text, then [`DEFAULT_SYSTEM_PROMPT`].
    pub fn resolve_system_prompt(&self) -> String {
        if let Some(path) = self.system_prompt_file.as_deref().filter(|p| p.is_file()) {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.is_empty() => return text,
                Ok(_) => tracing::warn!(path = %path.display(), "System prompt file is empty"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot read system prompt file")
                }
            }
        }

        match self.system_prompt.as_deref() {
            Some(inline) if !inline.is_empty() => inline.to_string(),
            _ => DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatbridge")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.token_secs == 0
            || self.timeouts.upload_secs == 0
            || self.timeouts.completion_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        if !matches!(self.history.backend.as_str(), "layered" | "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown history backend '{}' (expected layered, memory or file)",
                self.history.backend
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Check if both client credentials are present and not blank.
    pub fn has_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.auth.client_id) && filled(&self.auth.client_secret)
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
            api_base: default_api_base(),
            oauth_base: default_oauth_base(),
            model: default_model(),
            ca_bundle: None,
            system_prompt: None,
            system_prompt_file: None,
            auth: AuthConfig::default(),
            attachment: AttachmentConfig::default(),
            timeouts: TimeoutConfig::default(),
            history: HistoryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// `1`, `true`, `yes` and `on` (any case) switch a flag on; anything else is off.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
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
