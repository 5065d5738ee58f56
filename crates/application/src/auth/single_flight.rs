//! Single-flight execution keyed by an arbitrary value.
//!
//! At most one unit of work runs per key. Callers that arrive while it is
//! outstanding share its outcome instead of starting their own. The work
//! runs on its own task, so it settles (and its key is released) even if
//! every caller stops waiting.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;

type Outcome<T> = Shared<BoxFuture<'static, Option<T>>>;
type Registry<K, T> = Arc<Mutex<HashMap<K, Outcome<T>>>>;

/// Tracker of in-flight work, one ticket per key.
pub struct SingleFlight<K, T> {
    tickets: Registry<K, T>,
}

/// Handle on a (possibly shared) in-flight outcome.
#[must_use = "a flight does nothing for the caller unless awaited"]
pub struct Flight<T: Clone> {
    outcome: Outcome<T>,
    joined: bool,
}

impl<T: Clone> Flight<T> {
    /// True if this caller joined work started by someone else.
    pub const fn joined(&self) -> bool {
        self.joined
    }

    /// Waits for the outcome. `None` means the work panicked or was aborted.
    pub async fn wait(self) -> Option<T> {
        self.outcome.await
    }
}

/// Removes the ticket when the work settles, whether it returned or unwound.
struct Ticket<K: Eq + Hash, T> {
    tickets: Registry<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Ticket<K, T> {
    fn drop(&mut self) {
        self.tickets.lock().remove(&self.key);
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tickets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the work outstanding under `key`, or starts `work` if there is none.
    ///
    /// `work` is only invoked when a new flight starts. Must be called
    /// from within a tokio runtime.
    pub fn join<F, Fut>(&self, key: K, work: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut tickets = self.tickets.lock();
        if let Some(outcome) = tickets.get(&key) {
            return Flight {
                outcome: outcome.clone(),
                joined: true,
            };
        }

        let ticket = Ticket {
            tickets: Arc::clone(&self.tickets),
            key: key.clone(),
        };
        let work = work();
        let task = tokio::spawn(async move {
            let _ticket = ticket;
            work.await
        });
        let outcome = task.map(Result::ok).boxed().shared();
        tickets.insert(key, outcome.clone());

        Flight {
            outcome,
            joined: false,
        }
    }

    /// Returns true if work is outstanding under `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.tickets.lock().contains_key(key)
    }

    /// Number of outstanding tickets.
    pub fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.tickets.lock().is_empty()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
