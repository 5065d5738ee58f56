//! Session domain types

mod persisted;
mod types;

pub use persisted::{PersistedSession, RestoredSession, SESSION_SCHEMA_VERSION};
pub use types::{AuthSnapshot, CredentialPair, SessionRecord, UserProfile, token_preview};
