//! The session service the rest of the client talks to.

use std::sync::Arc;

use squadup_domain::{
    ApiRequest, ApiResponse, AuthError, AuthResult, AuthSnapshot, SessionSettings, UserProfile,
    token_preview,
};
use tokio::sync::{broadcast, watch};

use super::api::{AuthApi, LoginRequest, SessionGrant};
use super::dispatcher::RequestDispatcher;
use super::observer::SessionObserver;
use super::refresh::RefreshCoordinator;
use super::signals::{SessionEvent, SessionSignals};
use super::token_store::{Persistence, TokenStatus, TokenStore};
use super::verification::VerificationGate;
use crate::ports::{Clock, HttpTransport, SessionStorage};

/// Owns the token lifecycle for one client.
///
/// Build one per process and share it; every component inside holds the
/// same token store, so there is no hidden global state.
pub struct SessionCoordinator {
    settings: Arc<SessionSettings>,
    store: Arc<TokenStore>,
    api: Arc<AuthApi>,
    gate: VerificationGate,
    refresh: RefreshCoordinator,
    dispatcher: RequestDispatcher,
    signals: SessionSignals,
}

impl SessionCoordinator {
    /// Wires the session core onto the given adapters.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if the settings are unusable.
    pub fn new(
        settings: SessionSettings,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let signals = SessionSignals::default();
        let store = Arc::new(TokenStore::new(storage, Arc::clone(&clock)));
        let api = Arc::new(AuthApi::new(
            Arc::clone(&transport),
            Arc::clone(&settings),
            Arc::clone(&clock),
        ));
        let refresh =
            RefreshCoordinator::new(Arc::clone(&store), Arc::clone(&api), signals.clone());
        let gate = VerificationGate::new(
            Arc::clone(&store),
            Arc::clone(&api),
            clock,
            Arc::clone(&settings),
        );
        let dispatcher = RequestDispatcher::new(
            transport,
            Arc::clone(&store),
            refresh.clone(),
            Arc::clone(&settings),
        );

        Ok(Self {
            settings,
            store,
            api,
            gate,
            refresh,
            dispatcher,
            signals,
        })
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The token store shared by all components.
    #[must_use]
    pub const fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Loads the persisted session. Returns true if credentials were restored.
    pub async fn restore(&self) -> bool {
        let restored = self.store.restore().await;
        if restored {
            tracing::info!("restored persisted session");
        }
        restored
    }

    /// Startup sequence: restore, then verify unless recently verified.
    pub async fn bootstrap(&self) -> bool {
        self.restore().await && self.gate.check_status(false).await
    }

    /// Signs in with a username or email and password.
    ///
    /// The session reaches durable storage only if `credentials.remember`
    /// is set; otherwise it ends with the process.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for blank credentials or a malformed reply,
    /// `UpstreamRejected` if the server refused, `Network` if unreachable.
    pub async fn login(&self, credentials: &LoginRequest) -> AuthResult<UserProfile> {
        let grant = self.api.login(credentials).await?;
        self.open_session(grant, Persistence::remembered(credentials.remember)).await
    }

    /// Creates an account and signs in with it, remembering the session
    /// across restarts only if `remember` is set.
    ///
    /// # Errors
    ///
    /// Same as [`SessionCoordinator::login`].
    pub async fn register(
        &self,
        payload: &serde_json::Value,
        remember: bool,
    ) -> AuthResult<UserProfile> {
        let grant = self.api.register(payload).await?;
        self.open_session(grant, Persistence::remembered(remember)).await
    }

    /// Signs out. The server is told on a best-effort basis; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if let Some(access_token) = self.store.access_token()
            && let Err(e) = self.api.logout(&access_token).await
        {
            tracing::warn!(error = %e, "server logout failed, clearing local session anyway");
        }
        self.store.clear().await;
        tracing::info!("signed out");
        self.signals.emit(SessionEvent::SignedOut);
    }

    /// Local-only check: an access token and a cached user both exist.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.gate.is_authenticated()
    }

    /// Whether the session is valid; see [`VerificationGate::check_status`].
    pub async fn check_status(&self, force: bool) -> bool {
        self.gate.check_status(force).await
    }

    /// Route guard: the current user if the session checks out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the session is missing or
    /// the server no longer accepts it.
    pub async fn require_session(&self, force: bool) -> AuthResult<UserProfile> {
        if !self.gate.check_status(force).await {
            return Err(AuthError::Unauthenticated);
        }
        self.store.user().ok_or(AuthError::Unauthenticated)
    }

    /// Obtains a new access token; see [`RefreshCoordinator::refresh`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RefreshDenied` if the refresh failed.
    pub async fn refresh(&self) -> AuthResult<String> {
        self.refresh.refresh().await
    }

    /// Sends a request as the signed-in user; see
    /// [`RequestDispatcher::authenticated_request`].
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::authenticated_request`].
    pub async fn authenticated_request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatcher.authenticated_request(request).await
    }

    /// Cached user profile.
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.user()
    }

    /// Replaces the cached user after a profile edit.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if no session exists.
    pub async fn update_user(&self, user: UserProfile) -> AuthResult<()> {
        self.store.set_user(user).await
    }

    /// Access token status measured against the background refresh buffer.
    #[must_use]
    pub fn token_status(&self) -> TokenStatus {
        self.store.status(self.settings.observer_refresh_buffer_secs)
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.signals.subscribe()
    }

    /// Watches the authenticated flag and current user.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.store.subscribe()
    }

    /// A background observer sharing this session's refresh path.
    #[must_use]
    pub fn observer(&self) -> SessionObserver {
        SessionObserver::new(Arc::clone(&self.store), self.refresh.clone(), &self.settings)
    }

    async fn open_session(
        &self,
        grant: SessionGrant,
        persistence: Persistence,
    ) -> AuthResult<UserProfile> {
        self.store
            .begin_session_as(
                persistence,
                &grant.access_token,
                &grant.refresh_token,
                grant.ttl_secs,
                grant.user.clone(),
            )
            .await?;
        tracing::info!(
            access_token = %token_preview(&grant.access_token),
            ttl_secs = grant.ttl_secs,
            ?persistence,
            "signed in"
        );
        self.signals.emit(SessionEvent::SignedIn {
            user: grant.user.clone(),
        });
        Ok(grant.user)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MemoryStorage, ScriptedTransport};
    use chrono::Duration as TimeDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use squadup_domain::{HttpMethod, PersistedSession};

    struct Fixture {
        session: SessionCoordinator,
        transport: Arc<ScriptedTransport>,
        storage: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let storage = Arc::new(MemoryStorage::default());
        let clock = Arc::new(ManualClock::default());
        let session = SessionCoordinator::new(
            SessionSettings::default(),
            transport.clone(),
            storage.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            session,
            transport,
            storage,
            clock,
        }
    }

    fn grant() -> ApiResponse {
        ApiResponse::json_body(
            200,
            &json!({
                "access_token": "acc",
                "refresh_token": "ref",
                "expires_in": 3600,
                "user": {"username": "neo"}
            }),
        )
    }

    fn verified() -> ApiResponse {
        ApiResponse::json_body(200, &json!({"user": {"username": "neo"}}))
    }

    #[tokio::test]
    async fn test_login_stores_session_and_signals() {
        let f = fixture();
        f.transport.respond(HttpMethod::Post, "/api/auth/login", grant());
        let mut events = f.session.subscribe();
        let snapshot = f.session.watch();

        let user = f
            .session
            .login(&LoginRequest::new("neo", "secret").remember(true))
            .await
            .unwrap();

        assert_eq!(user.str_field("username"), Some("neo"));
        assert!(f.session.is_authenticated());
        assert!(snapshot.borrow().authenticated);
        assert_eq!(
            f.storage.stored().unwrap().access_token.as_deref(),
            Some("acc")
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn { user });
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state_alone() {
        let f = fixture();
        f.transport.respond(
            HttpMethod::Post,
            "/api/auth/login",
            ApiResponse::json_body(401, &json!({"error": "Invalid credentials"})),
        );

        let result = f.session.login(&LoginRequest::new("neo", "nope")).await;

        assert!(matches!(
            result,
            Err(AuthError::UpstreamRejected { status: 401, .. })
        ));
        assert!(!f.session.is_authenticated());
        assert!(f.storage.stored().is_none());
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let f = fixture();
        f.transport.respond(HttpMethod::Post, "/api/auth/register", grant());

        f.session
            .register(
                &json!({"username": "neo", "email": "neo@zion.io", "password": "x"}),
                true,
            )
            .await
            .unwrap();

        assert!(f.session.is_authenticated());
        assert!(f.storage.stored().is_some());
    }

    #[tokio::test]
    async fn test_login_without_remember_stays_in_memory() {
        let f = fixture();
        f.transport.respond(HttpMethod::Post, "/api/auth/login", grant());

        f.session
            .login(&LoginRequest::new("neo", "secret"))
            .await
            .unwrap();

        assert!(f.session.is_authenticated());
        assert_eq!(
            f.session.token_store().persistence().await,
            Persistence::Transient
        );
        assert!(f.storage.stored().is_none());
        assert_eq!(f.storage.saves(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_even_if_server_fails() {
        let f = fixture();
        f.transport.respond(HttpMethod::Post, "/api/auth/login", grant());
        f.transport
            .fail(HttpMethod::Post, "/api/auth/logout", "connection reset");
        f.session
            .login(&LoginRequest::new("neo", "secret").remember(true))
            .await
            .unwrap();
        let mut events = f.session.subscribe();

        f.session.logout().await;

        assert!(!f.session.is_authenticated());
        assert!(f.storage.stored().is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
        let logout = &f.transport.calls()[1];
        assert_eq!(logout.bearer_token(), Some("acc"));
    }

    #[tokio::test]
    async fn test_bootstrap_verifies_restored_session() {
        let f = fixture();
        f.storage.seed(PersistedSession {
            schema_version: 1,
            access_token: Some("acc".to_string()),
            refresh_token: Some("ref".to_string()),
            expires_at: Some(f.clock.now() + TimeDelta::hours(1)),
            user: Some(json!({"username": "neo"})),
            last_verified_at: None,
        });
        f.transport
            .respond(HttpMethod::Get, "/api/auth/verify", verified());

        assert!(f.session.bootstrap().await);
        assert_eq!(f.transport.calls_to(HttpMethod::Get, "/api/auth/verify"), 1);
        assert!(f.session.token_store().last_verified_at().is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_without_session_is_offline() {
        let f = fixture();
        assert!(!f.session.bootstrap().await);
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_require_session() {
        let f = fixture();
        assert_eq!(
            f.session.require_session(false).await,
            Err(AuthError::Unauthenticated)
        );

        f.transport.respond(HttpMethod::Post, "/api/auth/login", grant());
        f.transport
            .respond(HttpMethod::Get, "/api/auth/verify", verified());
        f.session
            .login(&LoginRequest::new("neo", "secret"))
            .await
            .unwrap();

        let user = f.session.require_session(false).await.unwrap();
        assert_eq!(user.str_field("username"), Some("neo"));
    }

    #[tokio::test]
    async fn test_update_user_keeps_tokens() {
        let f = fixture();
        f.transport.respond(HttpMethod::Post, "/api/auth/login", grant());
        f.session
            .login(&LoginRequest::new("neo", "secret"))
            .await
            .unwrap();

        let edited = UserProfile::from_value(json!({"username": "the-one"})).unwrap();
        f.session.update_user(edited.clone()).await.unwrap();

        assert_eq!(f.session.current_user(), Some(edited));
        assert_eq!(
            f.session.token_store().access_token().as_deref(),
            Some("acc")
        );
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let settings = SessionSettings {
            observer_interval_secs: 0,
            ..SessionSettings::default()
        };
        let result = SessionCoordinator::new(
            settings,
            Arc::new(ScriptedTransport::new()),
            Arc::new(MemoryStorage::default()),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
    }
}
