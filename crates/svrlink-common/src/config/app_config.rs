//! Application configuration structs
//!
//! Loads configuration from a JSON file (the path is given on the command
//! line or via `SVRLINK_CONFIG`), with environment variable overrides. The
//! same file is re-read on reload; only remotes with previously unseen ids
//! are acted on then.

use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Identity this process registers with on every gateway
    pub server_id: i32,
    pub server_type: i32,
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Gateways to hold persistent outbound links to
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,

    pub redis: RedisConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// One outbound gateway endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    pub remote_id: i32,
    pub remote_type: i32,
    pub addr: String,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_server_name() -> String {
    "svrlink".to_string()
}

fn default_redis_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a JSON file, with `SVRLINK_*` environment
    /// variables taking precedence over file values.
    ///
    /// # Errors
    /// Returns an error if the file is missing, not valid JSON, or missing
    /// required fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix("SVRLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::Load)?;

        settings.try_deserialize().map_err(ConfigError::Parse)
    }

    /// Remotes present in `self` but absent (by `remote_id`) from `previous`.
    ///
    /// Reload semantics: new entries spawn new links, existing ids are left
    /// untouched, removals are not retracted.
    #[must_use]
    pub fn new_remotes_since(&self, previous: &Self) -> Vec<RemoteConfig> {
        self.remotes
            .iter()
            .filter(|r| !previous.remotes.iter().any(|p| p.remote_id == r.remote_id))
            .cloned()
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Load(#[source] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Parse(#[source] config::ConfigError),
}
