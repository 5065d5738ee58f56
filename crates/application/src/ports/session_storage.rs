//! Session storage port
//!
//! Durable client storage for the session record. Survives restarts.

use async_trait::async_trait;
use squadup_domain::PersistedSession;

/// Errors that can occur during session persistence.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository trait for the persisted session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Loads the stored session.
    ///
    /// # Returns
    /// `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<PersistedSession>, StorageError>;

    /// Replaces the stored session.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written.
    async fn save(&self, session: &PersistedSession) -> Result<(), StorageError>;

    /// Erases the stored session. Erasing an empty store succeeds.
    ///
    /// # Errors
    /// Returns an error if the stored copy cannot be removed.
    async fn clear(&self) -> Result<(), StorageError>;
}
