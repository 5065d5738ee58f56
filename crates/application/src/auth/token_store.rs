//! Session token storage with expiry tracking.
//!
//! The store is the sole owner of token material. Reads are synchronous
//! snapshots of in-memory state; writes are serialized, applied to memory
//! in one step and then written through to storage. A session opened with
//! [`Persistence::Transient`] is written to process memory instead of the
//! durable backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use squadup_domain::{
    AuthError, AuthResult, AuthSnapshot, CredentialPair, PersistedSession, SessionRecord,
    UserProfile,
};
use tokio::sync::{Mutex, watch};

use super::memory_storage::MemorySessionStorage;
use crate::ports::{Clock, SessionStorage};

/// Converts a second count into a signed duration, saturating on overflow.
pub(crate) fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Where the current session is written through to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Durable storage; the session survives restarts ("remember me").
    #[default]
    Durable,
    /// Process memory only; the next start is signed out.
    Transient,
}

impl Persistence {
    /// `Durable` when the user asked to be remembered.
    #[must_use]
    pub const fn remembered(remember: bool) -> Self {
        if remember { Self::Durable } else { Self::Transient }
    }
}

/// Thread-safe session token store.
pub struct TokenStore {
    record: RwLock<SessionRecord>,
    /// Serializes writers so storage sees writes in memory order. Holds the
    /// backend the current session is written to.
    writes: Mutex<Persistence>,
    storage: Arc<dyn SessionStorage>,
    transient: MemorySessionStorage,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<AuthSnapshot>,
}

impl TokenStore {
    /// Creates an empty store with `storage` as its durable backend.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        Self {
            record: RwLock::new(SessionRecord::default()),
            writes: Mutex::new(Persistence::Durable),
            storage,
            transient: MemorySessionStorage::new(),
            clock,
            snapshot,
        }
    }

    /// Loads the persisted session into memory.
    ///
    /// Partial or malformed records are dropped and the stored copy erased.
    /// Returns true if a credential pair was restored.
    pub async fn restore(&self) -> bool {
        let mut persistence = self.writes.lock().await;
        *persistence = Persistence::Durable;

        let (persisted, unreadable) = match self.storage.load().await {
            Ok(persisted) => (persisted.unwrap_or_default(), false),
            Err(e) => {
                tracing::warn!(error = %e, "could not load persisted session, starting signed out");
                (PersistedSession::default(), true)
            }
        };

        let restored = persisted.into_record();
        if restored.discarded {
            tracing::warn!("persisted session was incomplete, discarding partial state");
        }
        let discarded = restored.discarded || unreadable;
        let has_credentials = restored.record.credentials.is_some();

        let snapshot = {
            let mut record = self.record.write();
            *record = restored.record;
            record.snapshot()
        };
        self.snapshot.send_replace(snapshot);

        if discarded && !has_credentials {
            self.persist(*persistence, &SessionRecord::default()).await;
        }
        has_credentials
    }

    /// Current access token, if a credential pair is present.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.record
            .read()
            .credentials
            .as_ref()
            .map(|c| c.access_token().to_string())
    }

    /// Current refresh token, if a credential pair is present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.record
            .read()
            .credentials
            .as_ref()
            .map(|c| c.refresh_token().to_string())
    }

    /// Access token expiry, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .read()
            .credentials
            .as_ref()
            .and_then(CredentialPair::expires_at)
    }

    /// Cached user profile.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.record.read().user.clone()
    }

    /// Time of the last successful network verification.
    #[must_use]
    pub fn last_verified_at(&self) -> Option<DateTime<Utc>> {
        self.record.read().last_verified_at
    }

    /// True if both tokens are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.record.read().credentials.is_some()
    }

    /// True iff an access token and a cached user both exist. No network.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.record.read().is_authenticated()
    }

    /// Copy of the whole record.
    #[must_use]
    pub fn record(&self) -> SessionRecord {
        self.record.read().clone()
    }

    /// True if `now > expires_at - buffer_secs`, or if no expiry is known.
    ///
    /// Without a credential pair the token counts as expired.
    #[must_use]
    pub fn is_expired(&self, buffer_secs: u64) -> bool {
        let now = self.clock.now();
        self.record
            .read()
            .credentials
            .as_ref()
            .is_none_or(|c| c.is_expired_at(now, seconds(buffer_secs)))
    }

    /// Status of the access token for display.
    #[must_use]
    pub fn status(&self, refresh_buffer_secs: u64) -> TokenStatus {
        let now = self.clock.now();
        let record = self.record.read();
        let Some(credentials) = record.credentials.as_ref() else {
            return TokenStatus::NotAuthenticated;
        };
        let seconds_remaining = credentials
            .expires_at()
            .map(|exp| (exp - now).num_seconds());

        if credentials.is_expired_at(now, Duration::zero()) {
            TokenStatus::Expired
        } else if credentials.is_expired_at(now, seconds(refresh_buffer_secs)) {
            TokenStatus::Expiring {
                seconds_remaining: seconds_remaining.unwrap_or(0),
            }
        } else {
            TokenStatus::Valid { seconds_remaining }
        }
    }

    /// Stores a new credential pair expiring `ttl_secs` from now.
    ///
    /// The cached user is kept; the verification timestamp is reset.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if either token is empty. The
    /// previous pair is left unchanged.
    pub async fn set_credential_pair(
        &self,
        access_token: &str,
        refresh_token: &str,
        ttl_secs: u64,
    ) -> AuthResult<()> {
        let pair = self.pair(access_token, refresh_token, ttl_secs)?;
        self.commit(move |record| {
            record.credentials = Some(pair);
            record.last_verified_at = None;
            Ok(())
        })
        .await
    }

    /// Replaces the whole session: new pair, new user, not yet verified.
    /// The session is written to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if either token is empty.
    pub async fn begin_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        ttl_secs: u64,
        user: UserProfile,
    ) -> AuthResult<()> {
        self.begin_session_as(
            Persistence::Durable,
            access_token,
            refresh_token,
            ttl_secs,
            user,
        )
        .await
    }

    /// Like [`TokenStore::begin_session`], writing the session through to
    /// the backend chosen by `persistence`.
    ///
    /// Switching backends erases the record held by the previous one, so a
    /// remembered session never outlives a later transient login.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if either token is empty.
    pub async fn begin_session_as(
        &self,
        persistence: Persistence,
        access_token: &str,
        refresh_token: &str,
        ttl_secs: u64,
        user: UserProfile,
    ) -> AuthResult<()> {
        let pair = self.pair(access_token, refresh_token, ttl_secs)?;
        self.commit_as(Some(persistence), move |record| {
            *record = SessionRecord {
                credentials: Some(pair),
                user: Some(user),
                last_verified_at: None,
            };
            Ok(())
        })
        .await
    }

    /// Backend the current session is written to.
    pub async fn persistence(&self) -> Persistence {
        *self.writes.lock().await
    }

    /// Swaps in a refreshed access token, keeping the refresh token.
    ///
    /// Only applies if the stored refresh token is still `expected_refresh`,
    /// so a refresh that raced with logout or a new login cannot resurrect
    /// or overwrite a different session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` if the token is empty or the
    /// session changed underneath the refresh.
    pub async fn replace_access_token(
        &self,
        expected_refresh: &str,
        access_token: &str,
        ttl_secs: u64,
    ) -> AuthResult<()> {
        let expires_at = self.expiry(ttl_secs);
        self.commit(move |record| {
            let current = record
                .credentials
                .as_ref()
                .filter(|c| c.refresh_token() == expected_refresh)
                .ok_or_else(|| {
                    AuthError::InvalidInput("session changed during refresh".to_string())
                })?;
            record.credentials = Some(current.with_access_token(access_token, expires_at)?);
            Ok(())
        })
        .await
    }

    /// Records a successful network verification of `verified_access` at
    /// the current time. Returns whether it was applied.
    ///
    /// Ignored if the session was cleared or replaced while verification
    /// was in flight.
    pub async fn record_verification(&self, verified_access: &str, user: UserProfile) -> bool {
        let now = self.clock.now();
        let applied = self
            .commit(move |record| {
                if !record
                    .credentials
                    .as_ref()
                    .is_some_and(|c| c.access_token() == verified_access)
                {
                    return Err(AuthError::Unauthenticated);
                }
                record.user = Some(user);
                record.last_verified_at = Some(now);
                Ok(())
            })
            .await
            .is_ok();
        if !applied {
            tracing::debug!("session changed during verification, result dropped");
        }
        applied
    }

    /// Replaces the cached user without touching tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if no session exists.
    pub async fn set_user(&self, user: UserProfile) -> AuthResult<()> {
        self.commit(move |record| {
            if record.credentials.is_none() {
                return Err(AuthError::Unauthenticated);
            }
            record.user = Some(user);
            Ok(())
        })
        .await
    }

    /// Erases credential pair, cached user and verification timestamp together.
    pub async fn clear(&self) {
        let _ = self
            .commit(|record| {
                *record = SessionRecord::default();
                Ok(())
            })
            .await;
    }

    /// Clears the session only if it still holds `expected_refresh`.
    ///
    /// Returns true if the session was cleared.
    pub async fn end_session(&self, expected_refresh: &str) -> bool {
        self.commit(|record| {
            let current = record
                .credentials
                .as_ref()
                .is_some_and(|c| c.refresh_token() == expected_refresh);
            if !current {
                return Err(AuthError::Unauthenticated);
            }
            *record = SessionRecord::default();
            Ok(())
        })
        .await
        .is_ok()
    }

    /// Subscribes to the UI snapshot, updated after every write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    fn expiry(&self, ttl_secs: u64) -> Option<DateTime<Utc>> {
        self.clock.now().checked_add_signed(seconds(ttl_secs))
    }

    fn pair(
        &self,
        access_token: &str,
        refresh_token: &str,
        ttl_secs: u64,
    ) -> AuthResult<CredentialPair> {
        CredentialPair::new(access_token, refresh_token, self.expiry(ttl_secs))
    }

    /// Applies `mutate` to a copy of the record and swaps it in on success.
    async fn commit<F>(&self, mutate: F) -> AuthResult<()>
    where
        F: FnOnce(&mut SessionRecord) -> AuthResult<()>,
    {
        self.commit_as(None, mutate).await
    }

    /// [`TokenStore::commit`], optionally moving the session to another backend.
    async fn commit_as<F>(&self, switch_to: Option<Persistence>, mutate: F) -> AuthResult<()>
    where
        F: FnOnce(&mut SessionRecord) -> AuthResult<()>,
    {
        let mut persistence = self.writes.lock().await;

        let committed = {
            let mut record = self.record.write();
            let mut next = record.clone();
            mutate(&mut next)?;
            *record = next;
            record.clone()
        };

        self.snapshot.send_replace(committed.snapshot());
        if let Some(next) = switch_to.filter(|next| next != &*persistence) {
            self.persist(*persistence, &SessionRecord::default()).await;
            tracing::debug!(from = ?*persistence, to = ?next, "session storage switched");
            *persistence = next;
        }
        self.persist(*persistence, &committed).await;
        Ok(())
    }

    fn backend(&self, persistence: Persistence) -> &dyn SessionStorage {
        match persistence {
            Persistence::Durable => self.storage.as_ref(),
            Persistence::Transient => &self.transient,
        }
    }

    async fn persist(&self, persistence: Persistence, record: &SessionRecord) {
        let storage = self.backend(persistence);
        let result = if *record == SessionRecord::default() {
            storage.clear().await
        } else {
            storage.save(&PersistedSession::from(record)).await
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session, keeping in-memory state");
        }
    }
}

/// Status of the access token for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// No credential pair exists.
    NotAuthenticated,
    /// Token is valid and not inside the refresh buffer.
    Valid {
        /// Seconds until expiry, or None if unknown.
        seconds_remaining: Option<i64>,
    },
    /// Token is valid but inside the refresh buffer.
    Expiring {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
    /// Token has expired; the next request refreshes first.
    Expired,
}

impl TokenStatus {
    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Not signed in".to_string(),
            Self::Valid {
                seconds_remaining: Some(secs),
            } => {
                if *secs > 3600 {
                    format!("Valid for {} hours", secs / 3600)
                } else if *secs > 60 {
                    format!("Valid for {} minutes", secs / 60)
                } else {
                    format!("Valid for {secs} seconds")
                }
            }
            Self::Valid {
                seconds_remaining: None,
            } => "Valid (no expiry)".to_string(),
            Self::Expiring { seconds_remaining } => {
                format!("Expiring in {seconds_remaining} seconds (will auto-refresh)")
            }
            Self::Expired => "Expired (will refresh on next request)".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MemoryStorage};
    use pretty_assertions::assert_eq;

    fn store() -> (TokenStore, Arc<ManualClock>, Arc<MemoryStorage>) {
        let clock = Arc::new(ManualClock::default());
        let storage = Arc::new(MemoryStorage::default());
        let store = TokenStore::new(storage.clone(), clock.clone());
        (store, clock, storage)
    }

    fn user(name: &str) -> UserProfile {
        UserProfile::from_value(serde_json::json!({ "username": name })).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let (store, _, _) = store();

        store.set_credential_pair("a", "r", 3600).await.unwrap();

        assert_eq!(store.access_token().as_deref(), Some("a"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
        assert!(!store.is_expired(0));
    }

    #[tokio::test]
    async fn test_empty_refresh_token_leaves_prior_pair() {
        let (store, _, storage) = store();
        store.set_credential_pair("a", "r", 3600).await.unwrap();
        let saves = storage.saves();

        let result = store.set_credential_pair("b", "", 3600).await;

        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
        assert_eq!(store.access_token().as_deref(), Some("a"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
        assert_eq!(storage.saves(), saves);
    }

    #[tokio::test]
    async fn test_expiry_respects_buffer() {
        let (store, clock, _) = store();
        store.set_credential_pair("a", "r", 600).await.unwrap();

        assert!(!store.is_expired(300));
        clock.advance(Duration::seconds(301));
        assert!(store.is_expired(300));
        assert!(!store.is_expired(0));
    }

    #[tokio::test]
    async fn test_missing_pair_counts_as_expired() {
        let (store, _, _) = store();
        assert!(store.is_expired(0));
    }

    #[tokio::test]
    async fn test_verification_of_replaced_session_is_dropped() {
        let (store, _, _) = store();
        store.begin_session("a", "r", 3600, user("neo")).await.unwrap();
        store
            .begin_session("b", "r2", 3600, user("trinity"))
            .await
            .unwrap();

        assert!(!store.record_verification("a", user("neo")).await);

        assert_eq!(store.last_verified_at(), None);
        assert_eq!(store.user(), Some(user("trinity")));
    }

    #[tokio::test]
    async fn test_transient_session_stays_off_durable_storage() {
        let (store, _, storage) = store();

        store
            .begin_session_as(Persistence::Transient, "a", "r", 3600, user("neo"))
            .await
            .unwrap();
        store.replace_access_token("r", "a2", 3600).await.unwrap();

        assert_eq!(store.persistence().await, Persistence::Transient);
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert!(storage.stored().is_none());
        assert_eq!(storage.saves(), 0);

        let restarted = TokenStore::new(storage, Arc::new(ManualClock::default()));
        assert!(!restarted.restore().await);
    }

    #[tokio::test]
    async fn test_transient_login_erases_remembered_session() {
        let (store, _, storage) = store();
        store.begin_session("a", "r", 3600, user("neo")).await.unwrap();
        assert!(storage.stored().is_some());

        store
            .begin_session_as(Persistence::Transient, "b", "r2", 3600, user("trinity"))
            .await
            .unwrap();

        assert!(storage.stored().is_none());
        assert_eq!(store.user(), Some(user("trinity")));
    }

    #[test]
    fn test_persistence_from_remember_flag() {
        assert_eq!(Persistence::remembered(true), Persistence::Durable);
        assert_eq!(Persistence::remembered(false), Persistence::Transient);
    }

    #[tokio::test]
    async fn test_clear_erases_everything() {
        let (store, _, storage) = store();
        store.begin_session("a", "r", 3600, user("neo")).await.unwrap();
        assert!(store.record_verification("a", user("neo")).await);
        assert!(storage.stored().is_some());

        store.clear().await;

        assert_eq!(store.record(), SessionRecord::default());
        assert!(storage.stored().is_none());
        assert!(!store.subscribe().borrow().authenticated);
    }

    #[tokio::test]
    async fn test_replace_access_token_keeps_refresh_token() {
        let (store, _, _) = store();
        store.begin_session("a", "r", 10, user("neo")).await.unwrap();

        store.replace_access_token("r", "a2", 3600).await.unwrap();

        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
        assert!(store.user().is_some());
        assert!(!store.is_expired(300));
    }

    #[tokio::test]
    async fn test_replace_access_token_after_logout_is_rejected() {
        let (store, _, _) = store();
        store.set_credential_pair("a", "r", 10).await.unwrap();
        store.clear().await;

        let result = store.replace_access_token("r", "a2", 3600).await;

        assert!(result.is_err());
        assert_eq!(store.access_token(), None);
    }

    #[tokio::test]
    async fn test_end_session_ignores_newer_session() {
        let (store, _, _) = store();
        store.set_credential_pair("a", "r1", 10).await.unwrap();
        store.set_credential_pair("b", "r2", 10).await.unwrap();

        assert!(!store.end_session("r1").await);
        assert_eq!(store.access_token().as_deref(), Some("b"));

        assert!(store.end_session("r2").await);
        assert_eq!(store.access_token(), None);
    }

    #[tokio::test]
    async fn test_restore_reads_persisted_session() {
        let (store, _, storage) = store();
        store.begin_session("a", "r", 3600, user("neo")).await.unwrap();

        let restored = TokenStore::new(storage.clone(), Arc::new(ManualClock::default()));
        assert!(restored.restore().await);
        assert!(restored.is_authenticated());
        assert_eq!(restored.access_token().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_restore_discards_half_pair() {
        let (store, _, storage) = store();
        storage.seed(PersistedSession {
            access_token: Some("a".to_string()),
            user: Some(serde_json::json!({"username": "neo"})),
            ..PersistedSession::default()
        });

        assert!(!store.restore().await);
        assert!(!store.is_authenticated());
        assert!(storage.stored().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_follows_writes() {
        let (store, _, _) = store();
        let rx = store.subscribe();

        store.begin_session("a", "r", 3600, user("neo")).await.unwrap();
        assert!(rx.borrow().authenticated);
        assert_eq!(rx.borrow().user, Some(user("neo")));
    }

    #[tokio::test]
    async fn test_token_status() {
        let (store, clock, _) = store();
        assert_eq!(store.status(600), TokenStatus::NotAuthenticated);

        store.set_credential_pair("a", "r", 3600).await.unwrap();
        assert!(matches!(store.status(600), TokenStatus::Valid { .. }));

        clock.advance(Duration::seconds(3300));
        assert!(matches!(store.status(600), TokenStatus::Expiring { .. }));

        clock.advance(Duration::seconds(301));
        assert_eq!(store.status(600), TokenStatus::Expired);
    }

    #[test]
    fn test_token_status_display_messages() {
        assert_eq!(
            TokenStatus::NotAuthenticated.display_message(),
            "Not signed in"
        );
        assert!(
            TokenStatus::Valid {
                seconds_remaining: Some(7200)
            }
            .display_message()
            .contains("hours")
        );
        assert!(
            TokenStatus::Expiring {
                seconds_remaining: 30
            }
            .display_message()
            .contains("auto-refresh")
        );
    }
}
