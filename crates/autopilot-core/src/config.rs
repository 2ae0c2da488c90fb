//! Configuration management for AutoPilot
//!
//! Configuration is read once at startup from `config.toml`, then overridden by
//! environment variables (including a `.env` file in the working directory).
//! The resulting [`Config`] is passed into constructors; nothing reads the
//! environment after startup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Google OAuth and Gmail API settings
    #[serde(default)]
    pub google: GoogleConfig,

    /// Language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Mailbox query settings
    #[serde(default)]
    pub mail: MailConfig,

    /// Conversational agent settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// REST server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Token storage provider configuration
    #[serde(default)]
    pub tokens: TokenProviderConfig,
}

/// Token storage provider configuration
///
/// ```toml
/// [tokens]
/// provider = "file"
/// path = "/custom/tokens.json"  # optional
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum TokenProviderConfig {
    /// File-based token storage (default)
    /// Stores tokens in ~/.config/autopilot/tokens.json
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
}

impl Default for TokenProviderConfig {
    fn default() -> Self {
        Self::File { path: None }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for rolling log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
        }
    }
}

/// Google OAuth client and Gmail API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client ID
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Long-lived refresh token (takes precedence over the token store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Gmail address of the mailbox owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Gmail REST API base URL
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Loopback port for the `autopilot auth` callback
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: None,
            address: None,
            api_base: default_gmail_api_base(),
            token_url: default_token_url(),
            redirect_port: default_redirect_port(),
        }
    }
}

impl GoogleConfig {
    /// Redirect URI registered with the OAuth client
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/oauth/callback", self.redirect_port)
    }
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat model name
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Ollama server base URL
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (0 disables the timeout)
    #[serde(default = "default_model_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            base_url: default_model_base_url(),
            request_timeout_secs: default_model_timeout(),
        }
    }
}

/// Mailbox query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Gmail search query selecting unread mail
    #[serde(default = "default_unread_query")]
    pub unread_query: String,

    /// Limit used when a caller does not pass one
    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            unread_query: default_unread_query(),
            default_limit: default_limit(),
        }
    }
}

/// Conversational agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Route tool results back to the model instead of ending the run
    #[serde(default)]
    pub chain_tool_calls: bool,

    /// Upper bound on node executions per run when chaining
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chain_tool_calls: false,
            max_steps: default_max_steps(),
        }
    }
}

/// REST server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_redirect_port() -> u16 {
    8085
}

fn default_model_name() -> String {
    "llama3.2".to_string()
}

fn default_model_base_url() -> String {
    "http://host.docker.internal:11434".to_string()
}

fn default_model_timeout() -> u64 {
    300
}

fn default_unread_query() -> String {
    "is:unread".to_string()
}

fn default_limit() -> u32 {
    10
}

fn default_max_steps() -> usize {
    8
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

/// Get the data directory (XDG: ~/.local/share/autopilot)
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join(crate::APP_NAME)
}

/// Get the config directory (XDG: ~/.config/autopilot)
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = get_config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("Failed to read .env: {}", e))),
        }

        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = var("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
        if let Some(v) = var("GOOGLE_REFRESH_TOKEN") {
            self.google.refresh_token = Some(v);
        }
        if let Some(v) = var("GMAIL_ADDRESS") {
            self.google.address = Some(v);
        }
        if let Some(v) = var("AUTOPILOT_MODEL") {
            self.model.name = v;
        }
        if let Some(v) = var("AUTOPILOT_MODEL_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = var("AUTOPILOT_LOG_LEVEL") {
            self.general.log_level = v;
        }
    }

    /// Check values that would only fail later, at request time
    pub fn validate(&self) -> Result<()> {
        if self.model.name.trim().is_empty() {
            return Err(Error::InvalidConfig {
                field: "model.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.server.port == 0 {
            return Err(Error::InvalidConfig {
                field: "server.port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.agent.chain_tool_calls && self.agent.max_steps == 0 {
            return Err(Error::InvalidConfig {
                field: "agent.max_steps".to_string(),
                reason: "must be at least 1 when chain_tool_calls is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the token file used by the file provider
    pub fn token_file(&self) -> PathBuf {
        match &self.tokens {
            TokenProviderConfig::File { path: Some(path) } => path.clone(),
            TokenProviderConfig::File { path: None } => get_config_dir().join("tokens.json"),
        }
    }
}
