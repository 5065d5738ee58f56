//! SquadUp Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus settings loading.

pub mod adapters;
pub mod persistence;
pub mod serialization;
pub mod settings;

pub use adapters::{ReqwestTransport, SystemClock};
pub use persistence::{FileSessionStorage, TokioFileSystem};
pub use serialization::{SerializationError, decode_document, encode_document};
pub use settings::{SettingsError, load_settings, session_path};
