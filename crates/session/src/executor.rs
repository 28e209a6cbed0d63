//! Credentialed requests with one-shot recovery from 401.

use std::sync::Arc;

use storefront_session_core::AuthTokens;

use crate::error::SessionError;
use crate::refresh::RefreshCoordinator;
use crate::tokens::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, Credentials, HttpTransport, TransportError};

/// Sends [`ApiRequest`]s with the current bearer token and recovers once from
/// an expired token.
///
/// A credentialed request that comes back 401 while a session is held is
/// retried exactly once: with the current token if another call refreshed
/// while this one was in flight, otherwise with the token from a (possibly
/// shared) refresh. If recovery fails the *original* 401 is returned. A
/// logical request never costs more than two transport calls.
#[derive(Clone)]
pub struct RequestExecutor {
    tokens: Arc<TokenStore>,
    refresher: RefreshCoordinator,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("refresher", &self.refresher)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Create an executor sharing `tokens` and `refresher` with the session.
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore>,
        refresher: RefreshCoordinator,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            tokens,
            refresher,
            transport,
        }
    }

    /// Execute `request` according to its [`Credentials`] policy.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` carrying the first 401 when it couldn't be recovered
    /// - `Transport` for any other failure of the first attempt
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        if request.credentials == Credentials::Omit {
            return self
                .transport
                .send(request.with_authorization(None))
                .await
                .map_err(SessionError::from);
        }

        let sent = self.tokens.current();
        let original = match self.send_with(&request, sent.as_ref()).await {
            Ok(response) => return Ok(response),
            Err(e) if !e.is_unauthorized() => return Err(SessionError::Transport(e)),
            Err(e) => e,
        };

        if request.credentials == Credentials::AttachWithoutRecovery {
            return Err(SessionError::Unauthorized(original));
        }

        let Some(current) = self.tokens.current() else {
            return Err(SessionError::Unauthorized(original));
        };

        let retry_with = if sent
            .as_ref()
            .is_some_and(|s| s.access_token != current.access_token)
        {
            tracing::debug!(path = %request.path, "Token changed in flight, retrying with current token");
            current
        } else {
            match self.refresher.refresh().await {
                Ok(refreshed) => {
                    tracing::debug!(path = %request.path, "Retrying after token refresh");
                    refreshed
                }
                Err(e) => {
                    tracing::debug!(path = %request.path, error = %e, "Could not recover from 401");
                    return Err(SessionError::Unauthorized(original));
                }
            }
        };

        match self.send_with(&request, Some(&retry_with)).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_unauthorized() && self.tokens.clear_if_current(&retry_with.refresh_token) {
                    tracing::warn!(path = %request.path, "Fresh token rejected, session cleared");
                    crate::error::clear_sentry_user();
                } else {
                    tracing::debug!(path = %request.path, error = %e, "Retry failed");
                }
                Err(SessionError::Unauthorized(original))
            }
        }
    }

    /// Send `request` once with `tokens`, whatever the store currently holds.
    ///
    /// Used after the session has already been cleared locally. No recovery.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a 401, `Transport` for anything else.
    pub async fn send_as(
        &self,
        request: ApiRequest,
        tokens: &AuthTokens,
    ) -> Result<ApiResponse, SessionError> {
        self.send_with(&request, Some(tokens))
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    SessionError::Unauthorized(e)
                } else {
                    SessionError::Transport(e)
                }
            })
    }

    async fn send_with(
        &self,
        request: &ApiRequest,
        tokens: Option<&AuthTokens>,
    ) -> Result<ApiResponse, TransportError> {
        let authorization = tokens.map(AuthTokens::authorization);
        self.transport
            .send(request.with_authorization(authorization))
            .await
    }
}
