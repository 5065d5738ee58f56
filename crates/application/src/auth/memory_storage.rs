//! Process-local session storage.

use async_trait::async_trait;
use parking_lot::Mutex;
use squadup_domain::PersistedSession;

use crate::ports::{SessionStorage, StorageError};

/// Keeps the session record for the lifetime of the process only.
///
/// Backs sessions opened without "remember me": nothing reaches the disk,
/// and the next process starts signed out.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    session: Mutex<Option<PersistedSession>>,
}

impl MemorySessionStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        Ok(self.session.lock().clone())
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.session.lock().take();
        Ok(())
    }
}
