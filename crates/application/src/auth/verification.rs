//! Decides when the cached session can be trusted without asking the server.

use std::sync::Arc;

use squadup_domain::SessionSettings;

use super::api::AuthApi;
use super::single_flight::SingleFlight;
use super::token_store::{TokenStore, seconds};
use crate::ports::Clock;

/// Cache-with-throttle in front of `GET /api/auth/verify`.
pub struct VerificationGate {
    store: Arc<TokenStore>,
    api: Arc<AuthApi>,
    clock: Arc<dyn Clock>,
    settings: Arc<SessionSettings>,
    in_flight: SingleFlight<String, bool>,
}

impl VerificationGate {
    /// Creates a gate over the given store.
    #[must_use]
    pub fn new(
        store: Arc<TokenStore>,
        api: Arc<AuthApi>,
        clock: Arc<dyn Clock>,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            store,
            api,
            clock,
            settings,
            in_flight: SingleFlight::new(),
        }
    }

    /// Local-only check: an access token and a cached user both exist.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// True if the last successful verification is inside the throttle window.
    #[must_use]
    pub fn recently_verified(&self) -> bool {
        let window = seconds(self.settings.verify_throttle_secs);
        self.store
            .last_verified_at()
            .is_some_and(|at| self.clock.now().signed_duration_since(at) < window)
    }

    /// Whether the session is valid, verifying over the network when needed.
    ///
    /// `force` skips the throttle but still joins a verification of the
    /// same access token already in flight. Never fails: a network error or
    /// a non-2xx reply is `false`.
    pub async fn check_status(&self, force: bool) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        if !force && self.recently_verified() {
            tracing::debug!("session verified recently, trusting cache");
            return true;
        }
        let Some(access_token) = self.store.access_token() else {
            return false;
        };

        let flight = self.in_flight.join(access_token.clone(), || {
            let store = Arc::clone(&self.store);
            let api = Arc::clone(&self.api);
            async move { verify(&store, &api, &access_token).await }
        });
        if flight.joined() {
            tracing::debug!("joining verification in flight");
        }
        flight.wait().await.unwrap_or(false)
    }
}

async fn verify(store: &TokenStore, api: &AuthApi, access_token: &str) -> bool {
    match api.verify(access_token).await {
        Ok(Some(user)) => store.record_verification(access_token, user).await,
        Ok(None) => {
            tracing::info!("server did not verify the session");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "session verification failed");
            false
        }
    }
}
