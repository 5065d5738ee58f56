//! Session events for the UI layer.

use squadup_domain::UserProfile;
use tokio::sync::broadcast;

/// Events emitted by the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Login or registration succeeded.
    SignedIn {
        /// The signed-in user.
        user: UserProfile,
    },
    /// A new access token was obtained.
    TokenRefreshed,
    /// Refresh failed; the session was cleared and the user must sign in again.
    SessionExpired {
        /// Why the refresh failed.
        reason: String,
    },
    /// The user signed out.
    SignedOut,
}

impl SessionEvent {
    /// True for events after which the UI should show the login surface.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired { .. } | Self::SignedOut)
    }
}

/// Broadcast channel of [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionSignals {
    events: broadcast::Sender<SessionEvent>,
}

impl SessionSignals {
    /// Creates a channel retaining up to `capacity` unread events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { events }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(?event, "session event");
        let _ = self.events.send(event);
    }

    /// Subscribes to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let signals = SessionSignals::default();
        let mut rx = signals.subscribe();

        signals.emit(SessionEvent::TokenRefreshed);
        signals.emit(SessionEvent::SignedOut);

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::TokenRefreshed);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedOut);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        SessionSignals::new(1).emit(SessionEvent::TokenRefreshed);
    }

    #[test]
    fn test_requires_login() {
        assert!(SessionEvent::SignedOut.requires_login());
        assert!(!SessionEvent::TokenRefreshed.requires_login());
    }
}
