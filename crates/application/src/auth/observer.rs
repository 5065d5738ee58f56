//! Background refresh ahead of expiry.

use std::sync::Arc;
use std::time::Duration;

use squadup_domain::{AuthError, SessionSettings};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;

/// What a single observer tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session, or the token is not yet inside the refresh buffer.
    Skipped,
    /// The access token was refreshed.
    Refreshed,
    /// The refresh failed; already logged.
    Failed(AuthError),
}

/// Timer that refreshes the access token before it expires.
#[derive(Clone)]
pub struct SessionObserver {
    store: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    startup_delay: Duration,
    interval: Duration,
    refresh_buffer_secs: u64,
}

impl SessionObserver {
    /// Creates an observer using the timing in `settings`.
    #[must_use]
    pub fn new(
        store: Arc<TokenStore>,
        refresh: RefreshCoordinator,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            store,
            refresh,
            startup_delay: Duration::from_secs(settings.observer_startup_delay_secs),
            interval: Duration::from_secs(settings.observer_interval_secs.max(1)),
            refresh_buffer_secs: settings.observer_refresh_buffer_secs,
        }
    }

    /// Runs one check: refreshes if both tokens exist and expiry is within the buffer.
    pub async fn tick(&self) -> TickOutcome {
        if !self.store.has_credentials() || !self.store.is_expired(self.refresh_buffer_secs) {
            return TickOutcome::Skipped;
        }

        tracing::debug!("access token inside refresh buffer, refreshing in background");
        match self.refresh.refresh().await {
            Ok(_) => TickOutcome::Refreshed,
            Err(e) => {
                tracing::warn!(error = %e, "background refresh failed");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Runs ticks until `shutdown` is cancelled: once after the startup
    /// delay, then every interval.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            startup_delay_secs = self.startup_delay.as_secs(),
            interval_secs = self.interval.as_secs(),
            "session observer started"
        );

        tokio::select! {
            () = tokio::time::sleep(self.startup_delay) => {}
            () = shutdown.cancelled() => return,
        }
        self.tick().await;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                () = shutdown.cancelled() => {
                    tracing::info!("session observer stopped");
                    return;
                }
            }
        }
    }

    /// Spawns [`SessionObserver::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
