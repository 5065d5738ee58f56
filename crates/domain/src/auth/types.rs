//! Credential and session types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Access and refresh token held together with the access token's expiry.
///
/// Both tokens are always non-empty: a half-set pair cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CredentialPair {
    /// Creates a credential pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if either token is empty or blank.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();

        if access_token.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "access token must not be empty".to_string(),
            ));
        }
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "refresh token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// The bearer token attached to API calls.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The token exchanged for new access tokens.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// When the access token expires, if known.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True if `now` is past `expires_at - buffer`, or if no expiry is known.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at.is_none_or(|expires_at| {
            expires_at
                .checked_sub_signed(buffer)
                .is_none_or(|deadline| now > deadline)
        })
    }

    /// Returns a pair with a new access token and the same refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if the access token is empty.
    pub fn with_access_token(
        &self,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<Self> {
        Self::new(access_token, self.refresh_token.clone(), expires_at)
    }
}

/// User payload returned by the server.
///
/// The session core only cares whether a profile is present; the fields
/// belong to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(serde_json::Value);

impl UserProfile {
    /// Wraps a server payload. `null` means no user.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if value.is_null() { None } else { Some(Self(value)) }
    }

    /// The raw payload.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Looks up a top-level string field such as `username`.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(serde_json::Value::as_str)
    }
}

/// Everything the client remembers about the current session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionRecord {
    /// Token material, absent when signed out.
    pub credentials: Option<CredentialPair>,
    /// Cached user profile.
    pub user: Option<UserProfile>,
    /// Last successful network verification; basis of the verification throttle.
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Local-only check: an access token and a cached user both exist.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.credentials.is_some() && self.user.is_some()
    }

    /// Snapshot published to the UI layer.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            authenticated: self.is_authenticated(),
            user: self.user.clone(),
        }
    }
}

/// UI-facing view of the session: authenticated flag plus current user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    /// Whether protected content may be shown.
    pub authenticated: bool,
    /// Current user, if cached.
    pub user: Option<UserProfile>,
}

/// Shortened token for log output (first 8 chars + ...).
#[must_use]
pub fn token_preview(token: &str) -> String {
    match token.char_indices().nth(8) {
        Some((idx, _)) if token.len() > 12 => format!("{}...", &token[..idx]),
        _ => token.to_string(),
    }
}
