//! SquadUp Application - Session coordination core
//!
//! This crate defines the session layer with:
//! - Port traits (interfaces for the transport, storage and clock)
//! - The session components and the [`SessionCoordinator`] façade
//! - Test doubles behind the `testing` feature

pub mod auth;
pub mod ports;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{
    AuthApi, Flight, LoginRequest, MemorySessionStorage, Persistence, RefreshCoordinator,
    RefreshGrant, RequestDispatcher, SessionCoordinator, SessionEvent, SessionGrant,
    SessionObserver, SessionSignals, SingleFlight, TickOutcome, TokenStatus, TokenStore,
    VerificationGate, jwt_expiry,
};
pub use ports::{
    Clock, FileSystem, FileSystemError, HttpTransport, SessionStorage, StorageError,
    TransportError,
};
