//! SquadUp Domain - Core session types
//!
//! This crate defines the domain model for the SquadUp session client.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;
pub mod request;
pub mod response;
pub mod settings;

pub use auth::{
    AuthSnapshot, CredentialPair, PersistedSession, RestoredSession, SessionRecord, UserProfile,
    token_preview,
};
pub use error::{AuthError, AuthResult};
pub use request::{ApiRequest, HttpMethod, RequestKey};
pub use response::ApiResponse;
pub use settings::SessionSettings;
