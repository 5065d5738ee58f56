//! File-based session storage.
//!
//! The session lives in a single JSON document, by default in the
//! platform config directory:
//! - Linux: ~/.config/squadup/session.json
//! - macOS: ~/Library/Application Support/squadup/session.json
//! - Windows: %APPDATA%/squadup/session.json

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use squadup_application::ports::{FileSystem, FileSystemError, SessionStorage, StorageError};
use squadup_domain::PersistedSession;
use squadup_domain::auth::SESSION_SCHEMA_VERSION;

use crate::serialization::{decode_document, encode_document};

/// Session storage backed by one JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write never leaves a truncated session behind.
///
/// ```json
/// {
///   "schema_version": 1,
///   "access_token": "eyJhbGciOi...",
///   "refresh_token": "eyJhbGciOi...",
///   "expires_at": "2026-01-01T01:00:00Z",
///   "user": { "id": 7, "username": "neo" },
///   "last_verified_at": "2026-01-01T00:00:05Z"
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionStorage<F> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> FileSessionStorage<F> {
    /// Creates storage writing to `path`.
    pub fn new(fs: F, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    /// The session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl<F: FileSystem> SessionStorage for FileSessionStorage<F> {
    async fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        let content = match self.fs.read_file(&self.path).await {
            Ok(content) => content,
            Err(FileSystemError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.into_io())),
        };

        let session: PersistedSession = decode_document(&content)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if session.schema_version > SESSION_SCHEMA_VERSION {
            tracing::warn!(
                found = session.schema_version,
                supported = SESSION_SCHEMA_VERSION,
                "session file written by a newer client"
            );
        }
        Ok(Some(session))
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let content = encode_document(session)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let temp = self.temp_path();

        self.fs
            .write_file(&temp, &content)
            .await
            .map_err(|e| StorageError::Io(e.into_io()))?;
        self.fs
            .rename(&temp, &self.path)
            .await
            .map_err(|e| StorageError::Io(e.into_io()))?;

        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match self.fs.remove_file(&self.path).await {
            Ok(()) | Err(FileSystemError::NotFound(_)) => Ok(()),
            Err(e) => Err(StorageError::Io(e.into_io())),
        }
    }
}
