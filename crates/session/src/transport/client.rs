//! `reqwest`-backed [`HttpTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ApiRequest, ApiResponse, HttpTransport, TransportError};
use crate::config::PlatformConfig;

const JSON: &str = "application/json";
const CLIENT_USER_AGENT: &str = concat!("storefront-session/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "x-api-key";

/// Transport that talks to the platform over HTTPS with `reqwest`.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ReqwestTransport {
    inner: Arc<ReqwestTransportInner>,
}

struct ReqwestTransportInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Create a transport for the configured platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key isn't a valid header value or the
    /// underlying client can't be built (e.g. no TLS backend).
    pub fn new(config: &PlatformConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if let Some(api_key) = &config.api_key {
            headers.insert(API_KEY_HEADER, api_key_header(api_key)?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ReqwestTransportInner {
                client,
                base_url: with_trailing_slash(config.api_url.clone()),
            }),
        })
    }

    /// The API base every request path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Network(format!("invalid request path {path}: {e}")))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut url = self.url_for(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        tracing::debug!(method = %request.method, path = %request.path, "Sending platform request");

        let mut builder = self.inner.client.request(request.method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(authorization) = &request.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, JSON).json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        let body = if bytes.is_empty() {
            None
        } else {
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => Some(value),
                Err(e) if status.is_success() => return Err(TransportError::Decode(e.to_string())),
                Err(_) => None,
            }
        };

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body: body.unwrap_or(serde_json::Value::Null),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

fn api_key_header(api_key: &SecretString) -> Result<HeaderValue, TransportError> {
    let mut value = HeaderValue::from_str(api_key.expose_secret())
        .map_err(|_| TransportError::Network("API key is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> PlatformConfig {
        PlatformConfig {
            api_url: Url::parse(api_url).unwrap(),
            api_key: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let transport = ReqwestTransport::new(&config("https://api.shop.test/v2")).unwrap();
        assert_eq!(transport.base_url().as_str(), "https://api.shop.test/v2/");
    }

    #[test]
    fn test_paths_resolve_under_base() {
        let transport = ReqwestTransport::new(&config("https://api.shop.test/v2/")).unwrap();
        assert_eq!(
            transport.url_for("/auth/login").unwrap().as_str(),
            "https://api.shop.test/v2/auth/login"
        );
        assert_eq!(
            transport.url_for("customer/profile").unwrap().as_str(),
            "https://api.shop.test/v2/customer/profile"
        );
    }

    #[test]
    fn test_debug_omits_client_internals() {
        let transport = ReqwestTransport::new(&config("https://api.shop.test")).unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("https://api.shop.test/"));
    }
}
