//! Durable shape of the session record.
//!
//! Storage is untrusted input: a record may be truncated, written by an
//! older client, or edited by hand. [`PersistedSession::into_record`]
//! validates it before the core ever sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CredentialPair, SessionRecord, UserProfile};

/// Current schema version written to storage.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Session record as written to durable client storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Storage format version
    #[serde(default)]
    pub schema_version: u32,
    /// Access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Serialized user record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    /// Last successful verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// Outcome of validating a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSession {
    /// The validated record.
    pub record: SessionRecord,
    /// True if partial or malformed state was dropped on the way in.
    pub discarded: bool,
}

impl PersistedSession {
    /// Validates the stored shape.
    ///
    /// A half-set credential pair counts as signed out: tokens, user and
    /// verification timestamp are all dropped together.
    #[must_use]
    pub fn into_record(self) -> RestoredSession {
        let had_anything = self.access_token.is_some()
            || self.refresh_token.is_some()
            || self.user.is_some()
            || self.last_verified_at.is_some();

        let credentials = match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => {
                CredentialPair::new(access, refresh, self.expires_at).ok()
            }
            _ => None,
        };

        let Some(credentials) = credentials else {
            return RestoredSession {
                record: SessionRecord::default(),
                discarded: had_anything,
            };
        };

        let user = self.user.and_then(UserProfile::from_value);
        let last_verified_at = user.as_ref().and(self.last_verified_at);

        RestoredSession {
            discarded: self.last_verified_at.is_some() && last_verified_at.is_none(),
            record: SessionRecord {
                credentials: Some(credentials),
                user,
                last_verified_at,
            },
        }
    }
}

impl From<&SessionRecord> for PersistedSession {
    fn from(record: &SessionRecord) -> Self {
        let credentials = record.credentials.as_ref();
        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            access_token: credentials.map(|c| c.access_token().to_string()),
            refresh_token: credentials.map(|c| c.refresh_token().to_string()),
            expires_at: credentials.and_then(CredentialPair::expires_at),
            user: record.user.as_ref().map(|u| u.as_value().clone()),
            last_verified_at: record.last_verified_at,
        }
    }
}
