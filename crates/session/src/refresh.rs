//! Single-flight access token refresh.
//!
//! At most one refresh request is in flight at any time. The first caller
//! spawns it; everyone who arrives before it completes awaits the same
//! [`Shared`] future and sees the same tokens or the same failure. The
//! refresh runs on its own task, so dropping every waiter never cancels it
//! half way through updating the [`TokenStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use storefront_session_core::AuthTokens;
use thiserror::Error;

use crate::api::{self, RefreshRequest, TokenGrant, paths};
use crate::error::{add_breadcrumb, clear_sentry_user};
use crate::tokens::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};

/// Why a refresh didn't produce new tokens.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// There was nothing to refresh with. No request was made.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The platform refused the refresh token. The session has been cleared.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The platform couldn't be reached or failed temporarily. The session
    /// was kept.
    #[error("refresh failed: {0}")]
    Transient(TransportError),

    /// The session was cleared or replaced while the refresh was running;
    /// its result was discarded.
    #[error("session changed during refresh")]
    Superseded,

    /// The refresh task panicked or was cancelled by runtime shutdown.
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

type RefreshResult = Result<AuthTokens, RefreshError>;

struct InFlight {
    epoch: u64,
    result: Shared<BoxFuture<'static, RefreshResult>>,
}

struct Inner {
    tokens: Arc<TokenStore>,
    transport: Arc<dyn HttpTransport>,
    in_flight: Mutex<Option<InFlight>>,
    next_epoch: AtomicU64,
    completed: AtomicU64,
}

/// Deduplicates concurrent refreshes into one platform call.
///
/// Cheap to clone; clones share the in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &self.is_refreshing())
            .field("completed", &self.completed_refreshes())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator that refreshes the tokens held by `tokens`.
    #[must_use]
    pub fn new(tokens: Arc<TokenStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                transport,
                in_flight: Mutex::new(None),
                next_epoch: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a new access token, joining a refresh that is already running.
    ///
    /// # Errors
    ///
    /// - `MissingRefreshToken` when no session is held (no request is made)
    /// - `Rejected` when the platform refused; the session is cleared
    /// - `Transient` on network trouble, timeouts, 429 or 5xx; the session
    ///   is kept
    /// - `Superseded` when the session changed underneath the refresh
    pub async fn refresh(&self) -> Result<AuthTokens, RefreshError> {
        let pending = {
            let mut slot = self.inner.slot();
            if let Some(in_flight) = slot.as_ref() {
                tracing::debug!(epoch = in_flight.epoch, "Joining in-flight token refresh");
                in_flight.result.clone()
            } else {
                // A session without a refresh token is left alone: its access
                // token stays usable until expiry and `load` drops it after.
                let refresh_token = self
                    .inner
                    .tokens
                    .refresh_token()
                    .ok_or(RefreshError::MissingRefreshToken)?;
                let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);

                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    let result = inner.perform(&refresh_token).await;
                    inner.finish(epoch);
                    result
                });

                let result = async move {
                    handle
                        .await
                        .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())))
                }
                .boxed()
                .shared();

                *slot = Some(InFlight {
                    epoch,
                    result: result.clone(),
                });
                result
            }
        };

        pending.await
    }

    /// Whether a refresh is currently running.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Number of refreshes that produced and stored new tokens.
    #[must_use]
    pub fn completed_refreshes(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, epoch: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|f| f.epoch == epoch) {
            *slot = None;
        }
    }

    async fn perform(&self, refresh_token: &str) -> RefreshResult {
        tracing::debug!("Refreshing access token");
        let request = ApiRequest::post(paths::REFRESH)
            .public()
            .json(&RefreshRequest { refresh_token });

        let outcome = match self.transport.send(request).await {
            Ok(response) => parse_grant(response, refresh_token),
            Err(e) if e.is_transient() => Err(RefreshError::Transient(e)),
            Err(e) => Err(RefreshError::Rejected(e.to_string())),
        };

        match outcome {
            Ok(tokens) => {
                if !self.tokens.replace_if_current(refresh_token, tokens.clone()) {
                    tracing::debug!("Session changed during refresh, discarding new tokens");
                    return Err(RefreshError::Superseded);
                }
                self.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(expires_at = %tokens.expires_at, "Refreshed access token");
                add_breadcrumb("auth", "Refreshed access token", None);
                Ok(tokens)
            }
            Err(RefreshError::Rejected(reason)) => {
                let cleared = self.tokens.clear_if_current(refresh_token);
                if cleared {
                    clear_sentry_user();
                }
                let error = RefreshError::Rejected(reason);
                let event_id = sentry::capture_error(&error);
                tracing::warn!(
                    error = %error,
                    cleared,
                    sentry_event_id = %event_id,
                    "Token refresh rejected, session cleared"
                );
                Err(error)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Token refresh failed, keeping session");
                Err(error)
            }
        }
    }
}

fn parse_grant(response: ApiResponse, previous_refresh: &str) -> RefreshResult {
    api::payload::<TokenGrant>(response)
        .and_then(|grant| grant.into_tokens(Utc::now(), Some(previous_refresh)))
        .map(|(tokens, _)| tokens)
        .map_err(|e| RefreshError::Rejected(e.to_string()))
}
