//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::storage::{self, DateAccessor, RunMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// History store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default)]
    pub mode: RunMode,

    /// Dotted path to the report date; `date` when unset
    #[serde(default)]
    pub date_field: Option<String>,
}

fn default_root() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("history-store").to_string_lossy().to_string())
        .unwrap_or_else(|| "./history-store-data".to_string())
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            mode: RunMode::default(),
            date_field: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("history-store").join("config.toml")),
            Some(PathBuf::from("/etc/history-store/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("HISTORY_STORE_ROOT") {
            self.store.root = root;
        }
        if let Ok(mode) = std::env::var("HISTORY_STORE_MODE") {
            match mode.parse() {
                Ok(mode) => self.store.mode = mode,
                Err(e) => tracing::warn!("Ignoring HISTORY_STORE_MODE: {}", e),
            }
        }
        if let Ok(field) = std::env::var("HISTORY_STORE_DATE_FIELD") {
            self.store.date_field = Some(field);
        }

        if let Ok(level) = std::env::var("HISTORY_STORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HISTORY_STORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Store settings as the storage layer takes them
    pub fn to_store_config(&self) -> Result<storage::StoreConfig, ConfigError> {
        let accessor = match &self.store.date_field {
            Some(field) => DateAccessor::parse(field).map_err(|e| ConfigError::Invalid {
                field: "store.date_field",
                error: e.to_string(),
            })?,
            None => DateAccessor::default(),
        };

        Ok(storage::StoreConfig::new(expand_home(&self.store.root))
            .mode(self.store.mode)
            .date_accessor(accessor))
    }
}

/// Resolve a leading `~` against the user's home directory
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config value for {field}: {error}")]
    Invalid { field: &'static str, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# History Store Configuration
#
# Environment variables override these settings:
# - HISTORY_STORE_ROOT
# - HISTORY_STORE_MODE
# - HISTORY_STORE_DATE_FIELD
# - HISTORY_STORE_LOG_LEVEL
# - HISTORY_STORE_LOG_FORMAT

[store]
# Root directory; one sub-directory per subject
root = "~/.local/share/history-store"

# Run mode: development, production or test
mode = "development"

# Dotted path to the report date (default: "date")
# date_field = "meta.timestamp"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/history-store/history-store.log"
"#
    .to_string()
}
