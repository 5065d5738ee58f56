//! Session client settings
//!
//! All timing constants of the session core live here so deployments can
//! tune them without code changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Server used when no base URL is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";

/// Settings for the session client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Base URL of the API server. Checked by [`SessionSettings::validate`].
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Minimum seconds between two network verifications when the cache is trusted.
    #[serde(default = "default_verify_throttle_secs")]
    pub verify_throttle_secs: u64,

    /// Safety margin before expiry at which a request refreshes first.
    #[serde(default = "default_request_expiry_buffer_secs")]
    pub request_expiry_buffer_secs: u64,

    /// Margin before expiry at which the background observer refreshes.
    #[serde(default = "default_observer_refresh_buffer_secs")]
    pub observer_refresh_buffer_secs: u64,

    /// Seconds between two observer ticks.
    #[serde(default = "default_observer_interval_secs")]
    pub observer_interval_secs: u64,

    /// Delay before the first observer tick after startup.
    #[serde(default = "default_observer_startup_delay_secs")]
    pub observer_startup_delay_secs: u64,

    /// Access token lifetime assumed when the server does not state one.
    #[serde(default = "default_access_ttl_secs")]
    pub default_access_ttl_secs: u64,

    /// Per-request transport timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Session file for remembered sessions. `None` means
    /// `<config dir>/squadup/session.json`. Sessions opened without
    /// "remember me" are never written here.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

const fn default_verify_throttle_secs() -> u64 {
    60
}

const fn default_request_expiry_buffer_secs() -> u64 {
    5 * 60
}

const fn default_observer_refresh_buffer_secs() -> u64 {
    10 * 60
}

const fn default_observer_interval_secs() -> u64 {
    10 * 60
}

const fn default_observer_startup_delay_secs() -> u64 {
    2
}

const fn default_access_ttl_secs() -> u64 {
    3600
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            verify_throttle_secs: default_verify_throttle_secs(),
            request_expiry_buffer_secs: default_request_expiry_buffer_secs(),
            observer_refresh_buffer_secs: default_observer_refresh_buffer_secs(),
            observer_interval_secs: default_observer_interval_secs(),
            observer_startup_delay_secs: default_observer_startup_delay_secs(),
            default_access_ttl_secs: default_access_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            storage_path: None,
            log_filter: default_log_filter(),
        }
    }
}

impl SessionSettings {
    /// Creates default settings pointing at the given server.
    #[must_use]
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// The parsed API base URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` unless it is an absolute http(s) URL.
    pub fn base_url(&self) -> AuthResult<Url> {
        let url = Url::parse(&self.api_base_url).map_err(|e| {
            AuthError::InvalidInput(format!("api_base_url {:?}: {e}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuthError::InvalidInput(format!(
                "api_base_url must be http(s), got {url}"
            )));
        }
        Ok(url)
    }

    /// Checks values that would make the client misbehave.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` for a missing or non-HTTP base URL
    /// or a zero observer interval.
    pub fn validate(&self) -> AuthResult<()> {
        self.base_url()?;
        if self.observer_interval_secs == 0 {
            return Err(AuthError::InvalidInput(
                "observer_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves an absolute URL or a path against `api_base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if the result is not a valid URL.
    pub fn resolve_url(&self, url: &str) -> AuthResult<Url> {
        if url.trim().is_empty() {
            return Err(AuthError::InvalidInput("URL is required".to_string()));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Url::parse(url).map_err(|e| AuthError::InvalidInput(format!("{e}: {url}")));
        }
        self.base_url()?
            .join(url)
            .map_err(|e| AuthError::InvalidInput(format!("{e}: {url}")))
    }
}
