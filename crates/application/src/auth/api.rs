//! Calls to the server's `/api/auth/*` endpoints.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squadup_domain::{
    ApiRequest, ApiResponse, AuthError, AuthResult, SessionSettings, UserProfile,
};

use super::jwt;
use crate::ports::{Clock, HttpTransport};

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const REFRESH_PATH: &str = "/api/auth/refresh";
const VERIFY_PATH: &str = "/api/auth/verify";
const LOGOUT_PATH: &str = "/api/auth/logout";

/// Credentials for `POST /api/auth/login`. `login` is a username or email.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub login: String,
    /// Plain password, sent over the transport's TLS.
    pub password: String,
    /// Keep the session across restarts. Never sent to the server.
    #[serde(skip)]
    pub remember: bool,
}

impl LoginRequest {
    /// Creates login credentials for a session that ends with the process.
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            remember: false,
        }
    }

    /// Sets whether the session survives restarts.
    #[must_use]
    pub const fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }
}

/// Token fields as sent by the server. Some deployments nest them under `tokens`.
#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Body of login, registration and refresh responses.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    fields: TokenFields,
    #[serde(default)]
    tokens: Option<TokenFields>,
    #[serde(default)]
    user: serde_json::Value,
}

impl TokenResponse {
    fn into_parts(self) -> (TokenFields, serde_json::Value) {
        let nested = self.tokens.unwrap_or_default();
        let fields = TokenFields {
            access_token: self.fields.access_token.or(nested.access_token),
            refresh_token: self.fields.refresh_token.or(nested.refresh_token),
            expires_in: self.fields.expires_in.or(nested.expires_in),
        };
        (fields, self.user)
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    user: serde_json::Value,
}

/// A full session issued by login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    /// New access token.
    pub access_token: String,
    /// New refresh token.
    pub refresh_token: String,
    /// Seconds the access token stays valid.
    pub ttl_secs: u64,
    /// Signed-in user.
    pub user: UserProfile,
}

/// A new access token issued by refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    /// New access token.
    pub access_token: String,
    /// Seconds the access token stays valid.
    pub ttl_secs: u64,
    /// User, if the server sent one along.
    pub user: Option<UserProfile>,
}

/// Client for the authentication endpoints.
pub struct AuthApi {
    transport: Arc<dyn HttpTransport>,
    settings: Arc<SessionSettings>,
    clock: Arc<dyn Clock>,
}

impl AuthApi {
    /// Creates a client sending through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        settings: Arc<SessionSettings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            settings,
            clock,
        }
    }

    /// Exchanges login credentials for a session.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for blank credentials or a malformed reply,
    /// `UpstreamRejected` for a non-2xx reply, `Network` if unreachable.
    pub async fn login(&self, credentials: &LoginRequest) -> AuthResult<SessionGrant> {
        if credentials.login.trim().is_empty() || credentials.password.is_empty() {
            return Err(AuthError::InvalidInput(
                "login and password are required".to_string(),
            ));
        }
        let body = serde_json::to_value(credentials)
            .map_err(|e| AuthError::InvalidInput(e.to_string()))?;
        self.open_session(LOGIN_PATH, &body).await
    }

    /// Creates an account; the registration payload is passed through as is.
    ///
    /// # Errors
    ///
    /// Same as [`AuthApi::login`].
    pub async fn register(&self, payload: &serde_json::Value) -> AuthResult<SessionGrant> {
        if !payload.is_object() {
            return Err(AuthError::InvalidInput(
                "registration payload must be a JSON object".to_string(),
            ));
        }
        self.open_session(REGISTER_PATH, payload).await
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Any failure, including a transport error, is `RefreshDenied`.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshGrant> {
        let request = ApiRequest::post(self.url(REFRESH_PATH)?).with_bearer(refresh_token);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::RefreshDenied(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::RefreshDenied(describe(&response)));
        }

        let (fields, user) = response
            .json::<TokenResponse>()
            .map_err(|e| AuthError::RefreshDenied(format!("malformed refresh response: {e}")))?
            .into_parts();
        let access_token = fields
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AuthError::RefreshDenied("refresh response had no access token".to_string())
            })?;

        Ok(RefreshGrant {
            ttl_secs: self.lifetime(&access_token, fields.expires_in),
            access_token,
            user: UserProfile::from_value(user),
        })
    }

    /// Asks the server whether the access token is still valid.
    ///
    /// Returns the user on 2xx, `None` on any other status.
    ///
    /// # Errors
    ///
    /// `Network` if the server could not be reached.
    pub async fn verify(&self, access_token: &str) -> AuthResult<Option<UserProfile>> {
        let request = ApiRequest::get(self.url(VERIFY_PATH)?).with_bearer(access_token);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            tracing::debug!(status = response.status, "verification rejected");
            return Ok(None);
        }

        Ok(response
            .json::<VerifyResponse>()
            .ok()
            .and_then(|body| UserProfile::from_value(body.user)))
    }

    /// Tells the server the access token is no longer used.
    ///
    /// # Errors
    ///
    /// `Network` or `UpstreamRejected`; callers treat both as advisory.
    pub async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let request = ApiRequest::post(self.url(LOGOUT_PATH)?).with_bearer(access_token);
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(response.into_rejection())
        }
    }

    async fn open_session(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> AuthResult<SessionGrant> {
        let request = ApiRequest::post(self.url(path)?).with_json(body);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let status = response.status;
            let body = response.error_message().unwrap_or(response.body);
            return Err(AuthError::UpstreamRejected { status, body });
        }

        let (fields, user) = response
            .json::<TokenResponse>()
            .map_err(|e| AuthError::InvalidInput(format!("malformed session response: {e}")))?
            .into_parts();
        let access_token = fields.access_token.unwrap_or_default();
        let refresh_token = fields.refresh_token.unwrap_or_default();
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "server returned an incomplete credential pair".to_string(),
            ));
        }
        let user = UserProfile::from_value(user)
            .ok_or_else(|| AuthError::InvalidInput("server returned no user".to_string()))?;

        Ok(SessionGrant {
            ttl_secs: self.lifetime(&access_token, fields.expires_in),
            access_token,
            refresh_token,
            user,
        })
    }

    /// `expires_in` if given, else the JWT `exp` claim, else the configured default.
    fn lifetime(&self, access_token: &str, expires_in: Option<u64>) -> u64 {
        expires_in
            .or_else(|| jwt::expiry(access_token).map(|exp| self.remaining(exp)))
            .unwrap_or(self.settings.default_access_ttl_secs)
    }

    fn remaining(&self, expires_at: DateTime<Utc>) -> u64 {
        u64::try_from((expires_at - self.clock.now()).num_seconds()).unwrap_or(0)
    }

    fn url(&self, path: &str) -> AuthResult<String> {
        self.settings.resolve_url(path).map(String::from)
    }
}

fn describe(response: &ApiResponse) -> String {
    match response.error_message() {
        Some(message) => format!("HTTP {}: {message}", response.status),
        None => format!("HTTP {}", response.status),
    }
}
