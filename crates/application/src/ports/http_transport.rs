//! HTTP transport port

use async_trait::async_trait;
use squadup_domain::{ApiRequest, ApiResponse, AuthError};
use thiserror::Error;

/// Errors raised below the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, header, body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for AuthError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::InvalidRequest(message) => Self::InvalidInput(message),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Port for sending HTTP requests.
///
/// Implementations return every HTTP status as `Ok`; only failures to get
/// a response at all are errors. Interpreting 401 and other statuses is the
/// session core's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request to its (absolute) URL.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when no response was received.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}
