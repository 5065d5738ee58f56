//! Response specification type

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// HTTP response returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lower-cased names)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body as string
    #[serde(default)]
    pub body: String,
}

impl ApiResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response whose body is the given JSON value.
    #[must_use]
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    /// Returns true if the status code indicates success (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true if the server signalled an invalid or expired token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Turns a non-success response into the error surfaced to callers.
    #[must_use]
    pub fn into_rejection(self) -> AuthError {
        AuthError::UpstreamRejected {
            status: self.status,
            body: self.body,
        }
    }

    /// Error message carried by a JSON `{"error": "..."}` body, if present.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        self.json::<ErrorBody>().ok().map(|body| body.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_checks() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(302, "").is_success());
        assert!(ApiResponse::new(401, "").is_unauthorized());
        assert!(!ApiResponse::new(403, "").is_unauthorized());
    }

    #[test]
    fn test_into_rejection_keeps_body_verbatim() {
        let err = ApiResponse::new(409, "squad full").into_rejection();
        assert_eq!(
            err,
            AuthError::UpstreamRejected {
                status: 409,
                body: "squad full".to_string()
            }
        );
    }

    #[test]
    fn test_error_message() {
        let response = ApiResponse::json_body(401, &serde_json::json!({"error": "Invalid credentials"}));
        assert_eq!(response.error_message().as_deref(), Some("Invalid credentials"));
        assert_eq!(ApiResponse::new(500, "oops").error_message(), None);
    }
}
