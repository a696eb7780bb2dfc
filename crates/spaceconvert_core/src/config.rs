//! Configuration for the spaceconvert bot
//!
//! Loaded from TOML, with environment variables layered on top for the
//! values that usually differ per deployment (homeserver, token, prefix).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::DEFAULT_COMMAND_PREFIX;
use crate::error::{ConfigError, CoreError, Result};

pub const ENV_HOMESERVER_URL: &str = "SPACECONVERT_HOMESERVER_URL";
pub const ENV_ACCESS_TOKEN: &str = "SPACECONVERT_ACCESS_TOKEN";
pub const ENV_COMMAND_PREFIX: &str = "SPACECONVERT_COMMAND_PREFIX";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceConvertConfig {
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Homeserver connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default = "default_homeserver_url")]
    pub homeserver_url: String,
    /// Access token of the bot account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How often a rate-limited request is retried before giving up
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

fn default_homeserver_url() -> String {
    "http://localhost:8008".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            homeserver_url: default_homeserver_url(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Join rooms the bot is invited to
    #[serde(default = "default_true")]
    pub auto_join_invites: bool,
    /// Long-poll timeout for `/sync`
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
}

fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_sync_timeout_secs() -> u64 {
    30
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            auto_join_invites: true,
            sync_timeout_secs: default_sync_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Where rolling log files go. Defaults to the user's local data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "spaceconvert.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("spaceconvert")
                .join("logs")
        })
    }
}

/// Load configuration from a TOML file
pub async fn load_config(path: &Path) -> Result<SpaceConvertConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "file".to_string(),
            expected: "readable TOML file".to_string(),
            cause: ConfigError::Io(e.to_string()),
        })?;

    let config: SpaceConvertConfig =
        toml::from_str(&content).map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "content".to_string(),
            expected: "valid TOML configuration".to_string(),
            cause: ConfigError::TomlParse(e.to_string()),
        })?;

    config.validate(&path.display().to_string())?;
    Ok(config)
}

/// Save configuration to a TOML file
pub async fn save_config(config: &SpaceConvertConfig, path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::ConfigurationError {
                config_path: parent.display().to_string(),
                field: "directory".to_string(),
                expected: "writable directory".to_string(),
                cause: ConfigError::Io(e.to_string()),
            })?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| CoreError::ConfigurationError {
        config_path: path.display().to_string(),
        field: "serialization".to_string(),
        expected: "serializable config structure".to_string(),
        cause: ConfigError::TomlSerialize(e.to_string()),
    })?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "file".to_string(),
            expected: "writable file location".to_string(),
            cause: ConfigError::Io(e.to_string()),
        })?;

    Ok(())
}

/// Standard config file locations
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("spaceconvert.toml")];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("spaceconvert").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".spaceconvert").join("config.toml"));
    }

    paths
}

/// Load configuration from standard locations, or defaults if none exists
pub async fn load_config_from_standard_locations() -> Result<SpaceConvertConfig> {
    for path in config_paths() {
        if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration");
            return load_config(&path).await;
        }
    }

    Ok(SpaceConvertConfig::default())
}

impl SpaceConvertConfig {
    pub async fn load() -> Result<Self> {
        load_config_from_standard_locations().await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        load_config(path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        save_config(self, path).await
    }

    /// Override file values with environment variables, looked up through
    /// `lookup` (normally `std::env::var(..).ok()`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(ENV_HOMESERVER_URL) {
            self.matrix.homeserver_url = url;
        }
        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            self.matrix.access_token = Some(token);
        }
        if let Some(prefix) = non_empty(ENV_COMMAND_PREFIX) {
            self.bot.command_prefix = prefix;
        }
    }

    pub fn validate(&self, config_path: &str) -> Result<()> {
        let invalid = |field: &str, reason: &str| CoreError::ConfigurationError {
            config_path: config_path.to_string(),
            field: field.to_string(),
            expected: reason.to_string(),
            cause: ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            },
        };

        let url = self.matrix.homeserver_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(
                "matrix.homeserver_url",
                "an http:// or https:// URL",
            ));
        }
        if self.bot.command_prefix.trim().is_empty() {
            return Err(invalid("bot.command_prefix", "a non-empty prefix"));
        }
        Ok(())
    }

    /// The access token, or a configuration error naming where to set it
    pub fn require_access_token(&self) -> Result<&str> {
        self.matrix
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                CoreError::missing_config(
                    "matrix.access_token",
                    format!("spaceconvert.toml (or set {ENV_ACCESS_TOKEN})"),
                )
            })
    }

    /// Copy safe to print
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.matrix.access_token.is_some() {
            config.matrix.access_token = Some("<redacted>".to_string());
        }
        config
    }
}
