//! Configuration management for chatsync
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! `CHATSYNC_*` environment variables, command-line flags.

use crate::error::{ChatSyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::store::DEFAULT_PENDING_CAPACITY;
use crate::transport::Backoff;

/// Main configuration structure for chatsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST and WebSocket endpoints
    #[serde(default)]
    pub api: ApiConfig,
    /// Reconnect behaviour of the event channel
    #[serde(default)]
    pub transport: TransportConfig,
    /// Conversation store limits
    #[serde(default)]
    pub store: StoreConfig,
    /// User-facing settings
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Credential storage
    #[serde(default)]
    pub auth: AuthConfig,
    /// GitHub repository browser
    #[serde(default)]
    pub github: GitHubConfig,
}

/// Server endpoints and request timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// WebSocket URL of the event stream
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: default_ws_url(),
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Parsed REST base URL.
    pub fn base_url(&self) -> Result<Url> {
        parse_url("api.base_url", &self.base_url, &["http", "https"])
    }

    /// Parsed WebSocket URL.
    pub fn ws_url(&self) -> Result<Url> {
        parse_url("api.ws_url", &self.ws_url, &["ws", "wss"])
    }
}

/// GitHub API endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Root of the GitHub REST API; point at an Enterprise host's
    /// `/api/v3` to browse there instead
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

fn default_github_api_url() -> String {
    crate::github::GITHUB_API_URL.to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
        }
    }
}

impl GitHubConfig {
    pub fn api_url(&self) -> Result<Url> {
        parse_url("github.api_url", &self.api_url, &["http", "https"])
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Delay before the first reconnect attempt, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on reconnect delays, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl TransportConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Conversation store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Messages held for conversations the store has not seen yet
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
}

fn default_pending_capacity() -> usize {
    DEFAULT_PENDING_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_capacity: default_pending_capacity(),
        }
    }
}

/// Colour theme of the front end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the terminal
    #[default]
    System,
    Light,
    Dark,
}

/// User-facing settings
///
/// These are read-only inputs. `api_key`, when set, is used as the bearer
/// token whenever no signed-in token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Picks the transcript palette of `chatsync chat`
    #[serde(default)]
    pub theme: Theme,

    /// Validated and carried for graphical front ends sharing this file;
    /// the terminal client does not use it.
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_font_size() -> u32 {
    14
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            font_size: default_font_size(),
            api_key: None,
        }
    }
}

/// Credential storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OS keyring service name the token is stored under
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_keyring_service() -> String {
    "chatsync".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keyring_service: default_keyring_service(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatSyncError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatSyncError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("CHATSYNC_API_BASE") {
            self.api.base_url = base_url;
        }

        if let Ok(ws_url) = std::env::var("CHATSYNC_WS_URL") {
            self.api.ws_url = ws_url;
        }

        if let Ok(api_url) = std::env::var("CHATSYNC_GITHUB_API_URL") {
            self.github.api_url = api_url;
        }

        if let Ok(api_key) = std::env::var("CHATSYNC_API_KEY") {
            self.settings.api_key = Some(api_key);
        }

        if let Ok(timeout) = std::env::var("CHATSYNC_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATSYNC_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(capacity) = std::env::var("CHATSYNC_PENDING_CAPACITY") {
            if let Ok(value) = capacity.parse() {
                self.store.pending_capacity = value;
            } else {
                tracing::warn!("Invalid CHATSYNC_PENDING_CAPACITY: {}", capacity);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.api_base {
            self.api.base_url = base_url.clone();
        }
        if let Some(ws_url) = &cli.ws_url {
            self.api.ws_url = ws_url.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures URLs parse with the right schemes and numeric values are
    /// within acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        self.api.base_url()?;
        self.api.ws_url()?;
        self.github.api_url()?;

        if self.api.timeout_seconds == 0 {
            return Err(
                ChatSyncError::Config("api.timeout_seconds must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.api.connect_timeout_seconds == 0 {
            return Err(ChatSyncError::Config(
                "api.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.transport.initial_backoff_ms == 0 {
            return Err(ChatSyncError::Config(
                "transport.initial_backoff_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.transport.max_backoff_ms < self.transport.initial_backoff_ms {
            return Err(ChatSyncError::Config(
                "transport.max_backoff_ms must be at least transport.initial_backoff_ms"
                    .to_string(),
            )
            .into());
        }

        if self.store.pending_capacity == 0 {
            return Err(ChatSyncError::Config(
                "store.pending_capacity must be greater than 0".to_string(),
            )
            .into());
        }

        if !(8..=72).contains(&self.settings.font_size) {
            return Err(ChatSyncError::Config(
                "settings.font_size must be between 8 and 72".to_string(),
            )
            .into());
        }

        if self.auth.keyring_service.trim().is_empty() {
            return Err(
                ChatSyncError::Config("auth.keyring_service cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

fn parse_url(field: &str, value: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| ChatSyncError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ChatSyncError::Config(format!(
            "{} must use one of: {}",
            field,
            schemes.join(", ")
        ))
        .into());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: [&str; 6] = [
        "CHATSYNC_API_BASE",
        "CHATSYNC_WS_URL",
        "CHATSYNC_GITHUB_API_URL",
        "CHATSYNC_API_KEY",
        "CHATSYNC_TIMEOUT_SECONDS",
        "CHATSYNC_PENDING_CAPACITY",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.store.pending_capacity, DEFAULT_PENDING_CAPACITY);
        assert_eq!(config.settings.theme, Theme::System);
        assert_eq!(config.auth.keyring_service, "chatsync");
    }

    #[test]
    fn test_config_validation_success() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_http_ws_url() {
        let mut config = Config::default();
        config.api.ws_url = "http://localhost:3000/ws".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api.ws_url"));
    }

    #[test]
    fn test_config_validation_rejects_garbage_base_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_github_api_url_defaults_and_validates() {
        let mut config = Config::default();
        assert_eq!(
            config.github.api_url().unwrap().as_str(),
            "https://api.github.com/"
        );
        config.github.api_url = "ftp://github.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("github.api_url"));
    }

    #[test]
    #[serial]
    fn test_github_api_url_from_env() {
        clear_env();
        std::env::set_var("CHATSYNC_GITHUB_API_URL", "https://ghe.example.com/api/v3");
        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_backoff_order() {
        let mut config = Config::default();
        config.transport.initial_backoff_ms = 5_000;
        config.transport.max_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_pending_capacity() {
        let mut config = Config::default();
        config.store.pending_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_font_size_range() {
        let mut config = Config::default();
        config.settings.font_size = 4;
        assert!(config.validate().is_err());
        config.settings.font_size = 72;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_from_transport_config() {
        let config = TransportConfig {
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
        };
        let backoff = config.backoff();
        assert_eq!(backoff.initial, Duration::from_millis(250));
        assert_eq!(backoff.max, Duration::from_secs(4));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
api:
  base_url: https://chat.example.com/api
settings:
  theme: dark
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api.base_url, "https://chat.example.com/api");
        assert_eq!(config.api.ws_url, default_ws_url());
        assert_eq!(config.settings.theme, Theme::Dark);
        assert_eq!(config.settings.font_size, 14);
    }

    #[test]
    #[serial]
    fn test_load_reads_file_then_env_then_cli() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api:\n  base_url: https://file.example.com/api\n  ws_url: wss://file.example.com/ws\nstore:\n  pending_capacity: 8"
        )
        .unwrap();

        std::env::set_var("CHATSYNC_PENDING_CAPACITY", "32");
        std::env::set_var("CHATSYNC_WS_URL", "wss://env.example.com/ws");
        let cli = crate::cli::Cli {
            ws_url: Some("wss://cli.example.com/ws".to_string()),
            ..Default::default()
        };

        let config = Config::load(file.path().to_str().unwrap(), &cli).unwrap();
        clear_env();

        assert_eq!(config.api.base_url, "https://file.example.com/api");
        assert_eq!(config.api.ws_url, "wss://cli.example.com/ws");
        assert_eq!(config.store.pending_capacity, 32);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::load(path.to_str().unwrap(), &crate::cli::Cli::default()).unwrap();
        assert_eq!(config.api.base_url, default_base_url());
    }

    #[test]
    #[serial]
    fn test_invalid_numeric_env_is_ignored() {
        clear_env();
        std::env::set_var("CHATSYNC_TIMEOUT_SECONDS", "soon");
        std::env::set_var("CHATSYNC_API_KEY", "key-123");
        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();

        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.settings.api_key.as_deref(), Some("key-123"));
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api: [unclosed").unwrap();
        let err = Config::load(file.path().to_str().unwrap(), &crate::cli::Cli::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
