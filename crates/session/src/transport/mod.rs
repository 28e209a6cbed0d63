//! HTTP transport abstraction for the platform REST API.
//!
//! The session layer never talks to `reqwest` directly. It builds an
//! [`ApiRequest`], hands it to an [`HttpTransport`], and gets back either an
//! [`ApiResponse`] or a [`TransportError`] that always carries the HTTP status
//! when there was one. This is what lets the request executor decide whether
//! a failure is recoverable, and what lets tests substitute a scripted fake.

mod client;

pub use client::ReqwestTransport;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use reqwest::Method;

/// HTTP status the executor recovers from.
pub const UNAUTHORIZED: u16 = 401;

/// Errors surfaced by an [`HttpTransport`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The platform answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// Platform message if the body carried one, else the reason phrase.
        message: String,
        /// Parsed JSON body, when there was one.
        body: Option<serde_json::Value>,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// A success response carried a body that isn't JSON.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Build a status error, pulling a `message` out of the JSON body if any.
    #[must_use]
    pub fn from_status(status: u16, body: Option<serde_json::Value>) -> Self {
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(
                || {
                    reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("request failed")
                        .to_string()
                },
                str::to_owned,
            );

        Self::Status {
            status,
            message,
            body,
        }
    }

    /// The HTTP status, if the platform responded at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(UNAUTHORIZED))
    }

    /// Whether retrying later could plausibly succeed: network trouble,
    /// timeouts, unparseable bodies, rate limiting and 5xx.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::Decode(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Whether and how a request carries the customer's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// Never send an `Authorization` header; never attempt 401 recovery.
    Omit,
    /// Send the current access token and recover once from a 401.
    Attach,
    /// Send the current access token but surface a 401 as-is.
    AttachWithoutRecovery,
}

/// A request against the platform API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base, e.g. `/auth/login`.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Extra headers beyond content negotiation and authorization.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Value for the `Authorization` header, filled in by the executor.
    pub authorization: Option<String>,
    /// Credential policy.
    pub credentials: Credentials,
}

impl ApiRequest {
    /// A credentialed request with no body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            authorization: None,
            credentials: Credentials::Attach,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE path`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Send without credentials (login, register, password reset, ...).
    #[must_use]
    pub fn public(mut self) -> Self {
        self.credentials = Credentials::Omit;
        self
    }

    /// Send credentials but never refresh-and-retry on a 401.
    #[must_use]
    pub fn without_recovery(mut self) -> Self {
        self.credentials = Credentials::AttachWithoutRecovery;
        self
    }

    /// Attach a JSON body.
    ///
    /// A value that fails to serialize (never the case for the plain structs
    /// used here) is sent as `null`.
    #[must_use]
    pub fn json(mut self, body: &impl Serialize) -> Self {
        self.body = Some(serde_json::to_value(body).unwrap_or(serde_json::Value::Null));
        self
    }

    /// Append a query pair.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Copy of this request carrying `authorization`, or none at all.
    #[must_use]
    pub fn with_authorization(&self, authorization: Option<String>) -> Self {
        Self {
            authorization,
            ..self.clone()
        }
    }
}

/// A successful platform response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// Numeric HTTP status (2xx).
    pub status: u16,
    /// JSON body; `Null` when the response had none.
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// A `200 OK` carrying `body`.
    #[must_use]
    pub const fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    /// Deserialize the whole body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body doesn't match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body)
    }
}

/// Something that can execute an [`ApiRequest`].
///
/// Implementations must surface every non-2xx response as
/// [`TransportError::Status`] so callers can tell a 401 from anything else.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute `request` once. No retries.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_prefers_body_message() {
        let err = TransportError::from_status(422, Some(json!({"message": "Email taken"})));
        assert_eq!(err.to_string(), "HTTP 422: Email taken");
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn test_status_error_falls_back_to_reason() {
        let err = TransportError::from_status(401, None);
        assert_eq!(err.to_string(), "HTTP 401: Unauthorized");
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::from_status(503, None).is_transient());
        assert!(TransportError::from_status(429, None).is_transient());
        assert!(!TransportError::from_status(400, None).is_transient());
        assert!(!TransportError::from_status(401, None).is_transient());
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/auth/login")
            .public()
            .json(&json!({"email": "a@b.c"}))
            .query("locale", "en");

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.credentials, Credentials::Omit);
        assert_eq!(req.body, Some(json!({"email": "a@b.c"})));
        assert_eq!(req.query, vec![("locale".to_string(), "en".to_string())]);

        let authed = req.with_authorization(Some("Bearer t".into()));
        assert_eq!(authed.authorization.as_deref(), Some("Bearer t"));
        assert_eq!(req.authorization, None);
    }
}
