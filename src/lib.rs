//! Core implementation of the Intune group explorer
//!
//! Reports which device-management artifacts (apps, scripts, compliance and
//! configuration policies, deployment profiles) reach a directory group,
//! either directly or through the groups it is a member of. Remote data is
//! fetched into a local snapshot so repeated lookups are fast; the snapshot
//! is replaced wholesale on every refresh.

use std::path::PathBuf;

use log::debug;

use crate::config_file::{
    Config, ConfigError, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID, Settings,
};

pub mod aggregate;
pub mod artifacts;
pub mod config_file;
pub mod graph_api;
pub mod hierarchy;
pub mod logger;
pub mod refresh;
pub mod report;
pub mod store;

/// Load settings from a config file (or auto-detect one), applying
/// environment overrides for the credentials.
///
/// When no file is given and none is found, the settings can still be built
/// entirely from the environment.
///
/// # Errors
///
/// Returns `ConfigError` if an explicit config file does not exist, cannot be
/// parsed, or the resulting settings are incomplete or invalid.
pub fn load_settings(config_file: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_with(config_file, |name| std::env::var(name).ok())
}

/// [`load_settings`] with an explicit environment lookup.
///
/// # Errors
///
/// See [`load_settings`].
pub fn load_settings_with<F>(config_file: Option<&str>, env: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match config_file {
        Some(file) => {
            let config_path = PathBuf::from(file);
            if !config_path.exists() {
                return Err(ConfigError::ConfigNotFound(config_path));
            }
            Config::from_file(&config_path)?
        }
        None => match Config::find_config() {
            Ok(config_path) => Config::from_file(&config_path)?,
            Err(ConfigError::ConfigNotFound(cwd))
                if [ENV_TENANT_ID, ENV_CLIENT_ID, ENV_CLIENT_SECRET]
                    .iter()
                    .all(|name| env(name).is_some()) =>
            {
                debug!(
                    "No config file above {}, using environment only",
                    cwd.display()
                );
                Config::default()
            }
            Err(e) => return Err(e),
        },
    };
    config.apply_env(env);
    let settings = Settings::try_from(config)?;
    debug!("Loaded settings: {settings:?}");
    Ok(settings)
}
