//! Test doubles for the session core's ports.
//!
//! Available to this crate's unit tests and, through the `testing` feature,
//! to integration tests of downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use squadup_domain::{ApiRequest, ApiResponse, HttpMethod, PersistedSession};

use crate::ports::{Clock, HttpTransport, SessionStorage, StorageError, TransportError};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward (or back, for a negative delta).
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    /// 2026-01-01T00:00:00Z
    fn default() -> Self {
        Self::at(DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

type Route = (HttpMethod, String);
type Reply = Result<ApiResponse, TransportError>;

/// Transport answering from per-route queues of canned replies.
///
/// Routes are keyed by method and URL path. Replies are consumed in order;
/// the last one repeats forever. Unscripted routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<Route, VecDeque<Reply>>>,
    calls: Mutex<Vec<ApiRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    /// Creates a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply by `latency` (tokio time, so paused clocks apply).
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a response for `method path`.
    pub fn respond(&self, method: HttpMethod, path: &str, response: ApiResponse) {
        self.push(method, path, Ok(response));
    }

    /// Queues a connection failure for `method path`.
    pub fn fail(&self, method: HttpMethod, path: &str, message: &str) {
        self.push(
            method,
            path,
            Err(TransportError::Connection(message.to_string())),
        );
    }

    /// Drops all replies queued for `method path`.
    pub fn reset_route(&self, method: HttpMethod, path: &str) {
        self.routes.lock().remove(&(method, path.to_string()));
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests sent to `method path`.
    #[must_use]
    pub fn calls_to(&self, method: HttpMethod, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && path_of(&call.url) == path)
            .count()
    }

    fn push(&self, method: HttpMethod, path: &str, reply: Reply) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, method: HttpMethod, path: &str) -> Reply {
        let mut routes = self.routes.lock();
        let Some(queue) = routes.get_mut(&(method, path.to_string())) else {
            return Ok(ApiResponse::new(404, "no scripted route"));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Ok(ApiResponse::new(404, "")))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(ApiResponse::new(404, "")))
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let method = request.method;
        let path = path_of(&request.url).to_string();
        self.calls.lock().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_reply(method, &path)
    }
}

/// Path component of an absolute URL, without query or fragment.
fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.find('/').map_or("/", |idx| &rest[idx..]);
    path.split(['?', '#']).next().unwrap_or(path)
}

/// In-memory session storage that counts writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stored: Mutex<Option<PersistedSession>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    /// Puts a record in place as if a previous run had saved it.
    pub fn seed(&self, session: PersistedSession) {
        *self.stored.lock() = Some(session);
    }

    /// The stored record, if any.
    #[must_use]
    pub fn stored(&self) -> Option<PersistedSession> {
        self.stored.lock().clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        Ok(self.stored.lock().clone())
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        *self.stored.lock() = Some(session.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.stored.lock() = None;
        Ok(())
    }
}
