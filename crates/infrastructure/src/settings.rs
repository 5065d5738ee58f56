//! Layered settings loading.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (`squadup.toml` in the working directory, or an explicit path)
//! 3. `SQUADUP_*` environment variables, e.g. `SQUADUP_API_BASE_URL`

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use squadup_domain::{AuthError, SessionSettings};

/// Settings file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "squadup.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "SQUADUP";

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A source could not be read or did not match the settings shape.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The merged settings are unusable.
    #[error("invalid settings: {0}")]
    Invalid(#[from] AuthError),

    /// Could not determine config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Loads settings from defaults, the settings file and the environment.
///
/// An explicit `path` must exist; the default file is optional.
///
/// # Errors
///
/// Returns `SettingsError` if a source is malformed or validation fails.
pub fn load_settings(path: Option<&Path>) -> Result<SessionSettings, SettingsError> {
    load_with(path, Environment::with_prefix(ENV_PREFIX))
}

fn load_with(path: Option<&Path>, env: Environment) -> Result<SessionSettings, SettingsError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
    };

    let settings: SessionSettings = Config::builder()
        .add_source(file)
        .add_source(env.try_parsing(true))
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    tracing::debug!(api_base_url = %settings.api_base_url, "settings loaded");
    Ok(settings)
}

/// Where the session file lives: `storage_path` if set, else the platform
/// config directory.
///
/// # Errors
///
/// Returns `SettingsError::NoConfigDir` if neither is available.
pub fn session_path(settings: &SessionSettings) -> Result<PathBuf, SettingsError> {
    if let Some(path) = &settings.storage_path {
        return Ok(path.clone());
    }
    dirs::config_dir()
        .map(|dir| dir.join("squadup").join("session.json"))
        .ok_or(SettingsError::NoConfigDir)
}
