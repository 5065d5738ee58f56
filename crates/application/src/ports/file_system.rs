//! Byte-level file access used by durable session storage.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

/// Why a file operation failed.
#[derive(Debug, thiserror::Error)]
pub enum FileSystemError {
    /// Nothing at that path.
    #[error("no such file: {0}")]
    NotFound(PathBuf),

    /// The process may not touch that path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Anything else the OS reported.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FileSystemError {
    /// Flattens back into an `io::Error` of the matching kind.
    #[must_use]
    pub fn into_io(self) -> io::Error {
        let (kind, path) = match self {
            Self::Io(err) => return err,
            Self::NotFound(path) => (io::ErrorKind::NotFound, path),
            Self::PermissionDenied(path) => (io::ErrorKind::PermissionDenied, path),
        };
        io::Error::new(kind, path.display().to_string())
    }
}

/// The four file operations an atomic session write needs.
///
/// Missing files are reported as [`FileSystemError::NotFound`], never
/// checked for up front, so a file deleted between check and read cannot
/// be misreported.
pub trait FileSystem: Send + Sync {
    /// Whole-file read.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is absent.
    fn read_file(&self, path: &Path)
    -> impl Future<Output = Result<Vec<u8>, FileSystemError>> + Send;

    /// Whole-file write; missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
    ) -> impl Future<Output = Result<(), FileSystemError>> + Send;

    /// Deletes one file.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is already gone.
    fn remove_file(&self, path: &Path) -> impl Future<Output = Result<(), FileSystemError>> + Send;

    /// Moves `from` over `to`, replacing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails.
    fn rename(
        &self,
        from: &Path,
        to: &Path,
    ) -> impl Future<Output = Result<(), FileSystemError>> + Send;
}
