//! Request specification type

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::HttpMethod;

/// Header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// An outbound HTTP request as seen by the session core.
///
/// Header names are stored as given; the authorization header is always
/// written by the core and never taken from caller input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL, or a path relative to the configured API base
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ApiRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Adds a header, replacing any existing value under the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a JSON body and the matching content type.
    #[must_use]
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.body = Some(body.to_string());
        self
    }

    /// Returns a copy carrying `Authorization: Bearer <token>`.
    ///
    /// Any caller-supplied authorization header, whatever its casing, is dropped.
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut request = self.clone();
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER));
        request
            .headers
            .insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        request
    }

    /// Returns the bearer token attached to this request, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION_HEADER))
            .and_then(|(_, value)| value.strip_prefix("Bearer "))
    }

    /// Key under which identical in-flight requests are deduplicated.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method,
            url: self.url.clone(),
        }
    }
}

/// Deduplication key of an in-flight request: method plus URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// HTTP method
    pub method: HttpMethod,
    /// Resolved URL
    pub url: String,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_with_bearer_replaces_caller_authorization() {
        let request = ApiRequest::get("https://api.example.com/me")
            .with_header("authorization", "Basic abc")
            .with_bearer("tok-1");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.bearer_token(), Some("tok-1"));
    }

    #[test]
    fn test_key_ignores_headers_and_body() {
        let a = ApiRequest::post("https://api.example.com/squads").with_header("X-Trace", "1");
        let b = ApiRequest::post("https://api.example.com/squads")
            .with_json(&serde_json::json!({"name": "alpha"}));

        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "POST https://api.example.com/squads");
    }

    #[test]
    fn test_with_json_sets_content_type() {
        let request =
            ApiRequest::post("/api/auth/login").with_json(&serde_json::json!({"login": "neo"}));

        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(r#"{"login":"neo"}"#));
    }
}
