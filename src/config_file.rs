//! Configuration file handling for the explorer
//!
//! Settings come from a YAML or JSON file found in the current directory or
//! one of its parents, with credentials optionally overridden from the
//! environment. The resolved [`Settings`] value is passed explicitly to every
//! component that needs it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file found in current directory or its parents: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid config: {0}")]
    Validation(String),
}

pub const ENV_TENANT_ID: &str = "INTUNE_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "INTUNE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "INTUNE_CLIENT_SECRET";

const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// List of supported configuration file names
const FILENAMES: [&str; 3] = [
    ".intune-explorer.json",
    ".intune-explorer.yaml",
    ".intune-explorer.yml",
];

/// Raw configuration as written in the file; every field is optional
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Only groups whose display name starts with this prefix are fetched
    pub group_prefix: Option<String>,
    /// Use the extended (beta) API surface and its additional artifact kinds
    pub extended: Option<bool>,
    pub cache_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub authority_url: Option<String>,
    pub graph_url: Option<String>,
}

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file)
            .map_err(|_| ConfigError::ConfigNotFound(file.to_path_buf()))?;
        let config: Config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Searches for a configuration file in the current directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownWorkingDirectory` if the cwd cannot be determined,
    /// or `ConfigError::ConfigNotFound` if no config file is found.
    pub fn find_config() -> Result<PathBuf, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?;
        Self::find_config_from(&cwd).ok_or(ConfigError::ConfigNotFound(cwd))
    }

    /// Searches `start` and its parents for a configuration file.
    #[must_use]
    pub fn find_config_from(start: &Path) -> Option<PathBuf> {
        let mut path = start.to_path_buf();
        debug!("Searching for config file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let config_path = path.join(file);
                if config_path.exists() {
                    info!("Found config file: {}", config_path.display());
                    return Some(config_path);
                }
            }
            if !path.pop() {
                return None;
            }
        }
    }

    /// Replace credentials with values from the environment where set.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (ENV_TENANT_ID, &mut self.tenant_id),
            (ENV_CLIENT_ID, &mut self.client_id),
            (ENV_CLIENT_SECRET, &mut self.client_secret),
        ];
        for (name, field) in overrides {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                debug!("Using {name} from the environment");
                *field = Some(value);
            }
        }
    }
}

/// Fully resolved settings
#[derive(Clone)]
pub struct Settings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub group_prefix: String,
    pub extended: bool,
    pub cache_path: PathBuf,
    pub request_timeout: Duration,
    pub authority_url: String,
    pub graph_url: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("group_prefix", &self.group_prefix)
            .field("extended", &self.extended)
            .field("cache_path", &self.cache_path)
            .field("request_timeout", &self.request_timeout)
            .field("authority_url", &self.authority_url)
            .field("graph_url", &self.graph_url)
            .finish()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Validation(format!("'{name}' must be set")))
}

/// Cache location used when the config does not name one: one database per
/// user and group prefix in the system temp directory.
#[must_use]
pub fn default_cache_path(group_prefix: &str) -> PathBuf {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    std::env::temp_dir().join(format!("intune-explorer-cache-{user}-{group_prefix}.db"))
}

impl TryFrom<Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        let timeout_secs = config.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "'request_timeout_secs' must be greater than zero".to_string(),
            ));
        }
        let group_prefix = config.group_prefix.unwrap_or_default();
        Ok(Settings {
            tenant_id: required(config.tenant_id, "tenant_id")?,
            client_id: required(config.client_id, "client_id")?,
            client_secret: required(config.client_secret, "client_secret")?,
            cache_path: config
                .cache_path
                .unwrap_or_else(|| default_cache_path(&group_prefix)),
            group_prefix,
            extended: config.extended.unwrap_or(true),
            request_timeout: Duration::from_secs(timeout_secs),
            authority_url: config
                .authority_url
                .unwrap_or_else(|| DEFAULT_AUTHORITY_URL.to_string()),
            graph_url: config
                .graph_url
                .unwrap_or_else(|| DEFAULT_GRAPH_URL.to_string()),
        })
    }
}
