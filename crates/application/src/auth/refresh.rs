//! Serialized access token refresh.
//!
//! At most one refresh call is outstanding at a time. Callers that arrive
//! while it runs queue up and all receive the same outcome, in arrival order.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use squadup_domain::{AuthError, AuthResult, token_preview};
use tokio::sync::oneshot;

use super::api::AuthApi;
use super::signals::{SessionEvent, SessionSignals};
use super::token_store::TokenStore;

type Waiter = oneshot::Sender<AuthResult<String>>;

/// Refresh state machine: `Idle -> Refreshing -> Idle`.
#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        /// Callers waiting on the current cycle, oldest first.
        waiters: Vec<Waiter>,
    },
}

impl RefreshState {
    fn finish(&mut self) -> Vec<Waiter> {
        match mem::take(self) {
            Self::Refreshing { waiters } => waiters,
            Self::Idle => Vec::new(),
        }
    }
}

struct Inner {
    state: Mutex<RefreshState>,
    store: Arc<TokenStore>,
    api: Arc<AuthApi>,
    signals: SessionSignals,
}

/// Returns the machine to `Idle` if a cycle ends without resolving its waiters.
///
/// Dropped waiters observe a closed channel and report `RefreshDenied`.
struct Cycle<'a> {
    state: &'a Mutex<RefreshState>,
}

impl Cycle<'_> {
    fn finish(self) -> Vec<Waiter> {
        self.state.lock().finish()
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        let abandoned = self.state.lock().finish();
        if !abandoned.is_empty() {
            tracing::warn!(waiters = abandoned.len(), "refresh cycle aborted");
        }
    }
}

/// Coordinates token refresh across the whole client.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new(store: Arc<TokenStore>, api: Arc<AuthApi>, signals: SessionSignals) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                store,
                api,
                signals,
            }),
        }
    }

    /// True while a refresh call is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Obtains a new access token, joining the refresh already underway if any.
    ///
    /// The refresh call runs on its own task, so it completes (and updates
    /// the store) even if every caller stops waiting.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RefreshDenied` if there is no refresh token or the
    /// server refused it. In the latter case the session has been cleared.
    pub async fn refresh(&self) -> AuthResult<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    tracing::debug!(position = waiters.len(), "joining refresh in flight");
                    waiters.push(tx);
                }
                RefreshState::Idle => {
                    let Some(refresh_token) = self.inner.store.refresh_token() else {
                        return Err(AuthError::RefreshDenied(
                            "no refresh token available".to_string(),
                        ));
                    };
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.run(refresh_token).await });
                }
            }
        }

        rx.await
            .unwrap_or_else(|_| Err(AuthError::RefreshDenied("refresh was aborted".to_string())))
    }
}

impl Inner {
    async fn run(&self, refresh_token: String) {
        let cycle = Cycle { state: &self.state };
        let (outcome, event) = self.exchange(&refresh_token).await;

        let waiters = cycle.finish();
        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        if let Some(event) = event {
            self.signals.emit(event);
        }
    }

    async fn exchange(&self, refresh_token: &str) -> (AuthResult<String>, Option<SessionEvent>) {
        tracing::info!(refresh_token = %token_preview(refresh_token), "refreshing access token");

        match self.api.refresh(refresh_token).await {
            Ok(grant) => {
                if self
                    .store
                    .replace_access_token(refresh_token, &grant.access_token, grant.ttl_secs)
                    .await
                    .is_err()
                {
                    tracing::info!("session changed during refresh, discarding new token");
                    let denied =
                        AuthError::RefreshDenied("session changed during refresh".to_string());
                    return (Err(denied), None);
                }
                if let Some(user) = grant.user {
                    let _ = self.store.set_user(user).await;
                }
                tracing::info!(
                    access_token = %token_preview(&grant.access_token),
                    ttl_secs = grant.ttl_secs,
                    "access token refreshed"
                );
                (Ok(grant.access_token), Some(SessionEvent::TokenRefreshed))
            }
            Err(e) => {
                let reason = e.to_string();
                let denied = match e {
                    AuthError::RefreshDenied(_) => e,
                    other => AuthError::RefreshDenied(other.to_string()),
                };
                if self.store.end_session(refresh_token).await {
                    tracing::warn!(%reason, "refresh denied, session cleared");
                    (Err(denied), Some(SessionEvent::SessionExpired { reason }))
                } else {
                    tracing::info!(%reason, "refresh denied for a session that already ended");
                    (Err(denied), None)
                }
            }
        }
    }
}
