//! Session and authentication core.
//!
//! This module provides:
//! - Token storage with expiry tracking and write-through persistence,
//!   durable or process-local per session
//! - A throttled, single-flighted verification gate
//! - Serialized token refresh with a FIFO waiter queue
//! - Authenticated request dispatch with deduplication and one retry
//! - A background observer that refreshes ahead of expiry

mod api;
mod coordinator;
mod dispatcher;
mod jwt;
mod memory_storage;
mod observer;
mod refresh;
mod signals;
mod single_flight;
mod token_store;
mod verification;

pub use api::{AuthApi, LoginRequest, RefreshGrant, SessionGrant};
pub use coordinator::SessionCoordinator;
pub use dispatcher::RequestDispatcher;
pub use jwt::expiry as jwt_expiry;
pub use memory_storage::MemorySessionStorage;
pub use observer::{SessionObserver, TickOutcome};
pub use refresh::RefreshCoordinator;
pub use signals::{SessionEvent, SessionSignals};
pub use single_flight::{Flight, SingleFlight};
pub use token_store::{Persistence, TokenStatus, TokenStore};
pub use verification::VerificationGate;
