//! Domain error types

use thiserror::Error;

/// Failure taxonomy of the session core.
///
/// Every public operation of the session client reports failures through
/// this type. It is `Clone` so one settled outcome can be handed to every
/// caller that joined the same in-flight operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A malformed credential write or request was rejected; state is unchanged.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No access token is present; the caller must sign in.
    #[error("not authenticated")]
    Unauthenticated,

    /// A token refresh failed or was impossible; the session has been cleared.
    #[error("token refresh denied: {0}")]
    RefreshDenied(String),

    /// Transport failure; session state is untouched so a retry is safe.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("request rejected with status {status}: {body}")]
    UpstreamRejected {
        /// HTTP status code returned by the server.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },
}

impl AuthError {
    /// Returns true when the caller has to send the user back to the login surface.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::RefreshDenied(_))
    }
}

/// Result type alias for session operations.
pub type AuthResult<T> = Result<T, AuthError>;
