use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sync::SyncSettings;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Deployment environment the build runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
            Environment::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(format!(
                "Invalid environment '{}'. Valid options: development, production, test",
                s
            )),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the REST API (e.g., "https://api.example.com")
    pub base_url: Option<String>,
    /// Drain the queue after every successful write (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    /// Per-item network timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auto_sync: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SyncConfig {
    /// Returns true if a base URL is configured
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database. `None` when the platform has no data directory.
    pub database_path: ConfigValue<Option<PathBuf>>,
    /// Deployment environment
    pub environment: ConfigValue<Environment>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    environment: Option<Environment>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().map(|dir| dir.join("wellnest.db")),
            ConfigSource::Default,
        );
        let mut environment = ConfigValue::new(Environment::default(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::Parse(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(Some(resolved_path), ConfigSource::File);
            }
            if let Some(env) = file_config.environment {
                environment = ConfigValue::new(env, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("WELLNEST_DATABASE_PATH") {
            database_path =
                ConfigValue::new(Some(PathBuf::from(db_path)), ConfigSource::Environment);
        }
        if let Ok(env) = std::env::var("WELLNEST_ENV") {
            let parsed = env
                .parse::<Environment>()
                .map_err(|e| ConfigError::InvalidValue("WELLNEST_ENV", e))?;
            environment = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("WELLNEST_SYNC_URL") {
            sync.base_url = Some(url);
        }
        if let Ok(flag) = std::env::var("WELLNEST_AUTO_SYNC") {
            sync.auto_sync = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(Self {
            database_path,
            environment,
            config_file,
            sync,
        })
    }

    /// Settings handed to the sync engine at construction.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            base_url: self.sync.base_url.clone(),
            environment: self.environment.value,
            item_timeout: Duration::from_secs(self.sync.timeout_secs.max(1)),
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/wellnest/
    /// - macOS: ~/Library/Application Support/wellnest/
    /// - Windows: %APPDATA%/wellnest/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wellnest")
    }

    /// Default data directory, if the platform has one.
    pub fn default_data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("wellnest"))
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
